pub use kiln_derive::WalkStrings;
use std::collections::HashMap;
use std::hash::Hash;

/// Recursive visit of every owned `String` in a value tree, used to apply
/// template substitution over parsed recipes.
pub trait WalkStrings {
    fn walk<W: StringWalker>(&mut self, walker: &mut W);
}

pub trait StringWalker {
    fn enter_string(&mut self, value: &mut String);
}

impl WalkStrings for String {
    fn walk<W: StringWalker>(&mut self, walker: &mut W) {
        walker.enter_string(self);
    }
}

impl<T: WalkStrings> WalkStrings for Vec<T> {
    fn walk<W: StringWalker>(&mut self, walker: &mut W) {
        for item in self {
            item.walk(walker);
        }
    }
}

impl<T: WalkStrings> WalkStrings for Option<T> {
    fn walk<W: StringWalker>(&mut self, walker: &mut W) {
        if let Some(v) = self {
            v.walk(walker);
        }
    }
}

impl WalkStrings for usize {
    fn walk<W: StringWalker>(&mut self, _: &mut W) {}
}

impl WalkStrings for bool {
    fn walk<W: StringWalker>(&mut self, _: &mut W) {}
}

impl<K: WalkStrings + Eq + Hash, V: WalkStrings> WalkStrings for HashMap<K, V> {
    fn walk<W: StringWalker>(&mut self, walker: &mut W) {
        let mut new_map = HashMap::new();

        for (mut k, mut v) in self.drain() {
            k.walk(walker);
            v.walk(walker);
            new_map.insert(k, v);
        }

        *self = new_map;
    }
}
