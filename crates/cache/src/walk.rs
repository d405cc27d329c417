//! Path resolution, component by component, with symlink expansion.
//!
//! A symlink target is spliced in front of whatever path components
//! were still pending by sharing the existing pending list rather than
//! rebuilding a concatenated string; `Pending` is a persistent
//! (reference-counted) cons list for exactly that reason, so splicing a
//! target with a long remaining tail is O(target length), not
//! O(target length + tail length).

use std::rc::Rc;

use wire::CephfsError;

/// Bounded the same way the kernel bounds `/proc/sys/fs/protected_symlinks`-style
/// resolution: sixteen indirections and no further.
const MAX_SYMLINK_INDIRECTIONS: u32 = 16;

struct Node {
    component: String,
    next: Pending,
}

#[derive(Clone, Default)]
struct Pending(Option<Rc<Node>>);

impl Pending {
    fn from_path(path: &str) -> Self {
        let mut nodes: Vec<String> = path.split('/').filter(|part| !part.is_empty()).map(str::to_string).collect();
        let mut tail = Pending::default();
        while let Some(component) = nodes.pop() {
            tail = Pending(Some(Rc::new(Node { component, next: tail })));
        }
        tail
    }

    fn pop_front(&mut self) -> Option<String> {
        let node = self.0.take()?;
        match Rc::try_unwrap(node) {
            Ok(node) => {
                *self = node.next;
                Some(node.component)
            }
            Err(shared) => {
                *self = shared.next.clone();
                Some(shared.component.clone())
            }
        }
    }

    fn push_front_path(&mut self, path: &str) {
        let mut components: Vec<&str> = path.split('/').filter(|part| !part.is_empty()).collect();
        let mut tail = std::mem::take(self);
        while let Some(component) = components.pop() {
            tail = Pending(Some(Rc::new(Node { component: component.to_string(), next: tail })));
        }
        *self = tail;
    }
}

/// One step of resolution: either the name resolved to a concrete inode,
/// or it named a symlink whose target must be spliced in and
/// re-resolved.
pub enum Step {
    Inode(u64),
    Symlink(String),
}

/// External lookups the walker drives; implemented against the dentry
/// cache plus a native `ll_lookup`/`ll_readlink` fallback on a miss.
pub trait PathResolver {
    fn lookup(&self, parent_ino: u64, name: &str) -> Result<Step, CephfsError>;
    /// The inode one level up from `ino`, for `..`. Resolving past the
    /// root returns `ino` itself, matching `cd ..` at `/`.
    fn parent_of(&self, ino: u64) -> Result<u64, CephfsError>;
}

/// Resolves `path` starting at `cwd_ino` (or `root_ino` if `path` is
/// absolute), returning the inode it names.
pub fn walk(resolver: &impl PathResolver, root_ino: u64, cwd_ino: u64, path: &str) -> Result<u64, CephfsError> {
    let mut current = if path.starts_with('/') { root_ino } else { cwd_ino };
    let mut pending = Pending::from_path(path);
    let mut indirections = 0u32;

    while let Some(component) = pending.pop_front() {
        match component.as_str() {
            "." => continue,
            ".." => {
                current = resolver.parent_of(current)?;
                continue;
            }
            name => match resolver.lookup(current, name)? {
                Step::Inode(ino) => current = ino,
                Step::Symlink(target) => {
                    indirections += 1;
                    if indirections > MAX_SYMLINK_INDIRECTIONS {
                        return Err(CephfsError::SymlinkLoop);
                    }
                    if target.starts_with('/') {
                        current = root_ino;
                    }
                    pending.push_front_path(&target);
                }
            },
        }
    }

    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FakeFs {
        children: HashMap<(u64, String), Step>,
        parents: HashMap<u64, u64>,
    }

    impl FakeFs {
        fn new() -> Self {
            Self { children: HashMap::new(), parents: HashMap::new() }
        }

        fn add_dir(&mut self, parent: u64, name: &str, ino: u64) {
            self.children.insert((parent, name.to_string()), Step::Inode(ino));
            self.parents.insert(ino, parent);
        }

        fn add_symlink(&mut self, parent: u64, name: &str, target: &str) {
            self.children.insert((parent, name.to_string()), Step::Symlink(target.to_string()));
        }
    }

    impl PathResolver for FakeFs {
        fn lookup(&self, parent_ino: u64, name: &str) -> Result<Step, CephfsError> {
            match self.children.get(&(parent_ino, name.to_string())) {
                Some(Step::Inode(ino)) => Ok(Step::Inode(*ino)),
                Some(Step::Symlink(target)) => Ok(Step::Symlink(target.clone())),
                None => Err(CephfsError::Native(2)),
            }
        }

        fn parent_of(&self, ino: u64) -> Result<u64, CephfsError> {
            Ok(*self.parents.get(&ino).unwrap_or(&ino))
        }
    }

    const ROOT: u64 = 1;

    #[test]
    fn resolves_a_simple_absolute_path() {
        let mut fs = FakeFs::new();
        fs.add_dir(ROOT, "a", 2);
        fs.add_dir(2, "b", 3);
        assert_eq!(walk(&fs, ROOT, ROOT, "/a/b").unwrap(), 3);
    }

    #[test]
    fn dot_and_dotdot_are_handled() {
        let mut fs = FakeFs::new();
        fs.add_dir(ROOT, "a", 2);
        fs.add_dir(2, "b", 3);
        assert_eq!(walk(&fs, ROOT, ROOT, "/a/./b/../b").unwrap(), 3);
    }

    #[test]
    fn relative_paths_resolve_against_cwd() {
        let mut fs = FakeFs::new();
        fs.add_dir(ROOT, "a", 2);
        fs.add_dir(2, "b", 3);
        assert_eq!(walk(&fs, ROOT, 2, "b").unwrap(), 3);
    }

    #[test]
    fn a_symlink_is_expanded_and_the_remaining_tail_still_resolves() {
        let mut fs = FakeFs::new();
        fs.add_dir(ROOT, "a", 2);
        fs.add_dir(2, "b", 3);
        fs.add_dir(3, "c", 4);
        fs.add_symlink(ROOT, "link", "a/b");
        assert_eq!(walk(&fs, ROOT, ROOT, "/link/c").unwrap(), 4);
    }

    #[test]
    fn an_absolute_symlink_target_resets_to_root() {
        let mut fs = FakeFs::new();
        fs.add_dir(ROOT, "real", 2);
        fs.add_symlink(ROOT, "link", "/real");
        assert_eq!(walk(&fs, ROOT, ROOT, "/link").unwrap(), 2);
    }

    #[test]
    fn a_symlink_cycle_is_rejected_with_eloop() {
        let mut fs = FakeFs::new();
        fs.add_symlink(ROOT, "a", "b");
        fs.add_symlink(ROOT, "b", "a");
        assert!(matches!(walk(&fs, ROOT, ROOT, "/a"), Err(CephfsError::SymlinkLoop)));
    }

    #[test]
    fn dotdot_past_root_stays_at_root() {
        let fs = FakeFs::new();
        assert_eq!(walk(&fs, ROOT, ROOT, "..").unwrap(), ROOT);
    }
}
