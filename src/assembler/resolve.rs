use super::model::FunctionId;
use std::collections::{hash_map::Entry, HashMap};
use std::fmt;

/// Patch sites (instruction indices) waiting on a name, bucketed by that name.
///
/// Buckets remember the order in which names were first deferred, so that error
/// messages list unresolved names in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Patches {
    order: Vec<String>,
    sites: HashMap<String, Vec<usize>>,
}

impl Patches {
    pub fn defer(&mut self, name: &str, site: usize) {
        match self.sites.entry(name.to_owned()) {
            Entry::Occupied(mut bucket) => bucket.get_mut().push(site),
            Entry::Vacant(bucket) => {
                self.order.push(name.to_owned());
                bucket.insert(vec![site]);
            }
        }
    }

    /// Removes and returns every site waiting on `name`.
    pub fn take(&mut self, name: &str) -> Vec<usize> {
        match self.sites.remove(name) {
            Some(sites) => {
                self.order.retain(|n| n != name);
                sites
            }
            None => Vec::new(),
        }
    }

    /// Sites waiting on `name`, without removing them.
    pub fn sites(&self, name: &str) -> &[usize] {
        self.sites.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}

pub fn jump_delta(target: usize, site: usize) -> i64 {
    target as i64 - site as i64 - 1
}

/// Jump labels of the function currently being assembled.
#[derive(Debug, Default)]
pub struct Labels {
    targets: HashMap<String, usize>,
    pending: Patches,
}

/// The value a location operand takes until its label is declared.
pub const UNRESOLVED_LOCATION: i64 = -1;

impl Labels {
    /// The jump delta from `site` to `name`, if the label has been declared.
    pub fn resolved(&self, name: &str, site: usize) -> Option<i64> {
        self.targets
            .get(name)
            .map(|target| jump_delta(*target, site))
    }

    /// Queues `site` to be patched once `name` is declared.
    pub fn defer(&mut self, name: &str, site: usize) {
        self.pending.defer(name, site);
    }

    /// Forward references to `name` still waiting for its declaration.
    pub fn pending(&self, name: &str) -> &[usize] {
        self.pending.sites(name)
    }

    /// Binds `name` to `target`, returning the `(site, delta)` pairs of every pending forward
    /// reference to it. A redeclaration only affects references made after it.
    pub fn declare(&mut self, name: &str, target: usize) -> Vec<(usize, i64)> {
        self.targets.insert(name.to_owned(), target);
        self.pending
            .take(name)
            .into_iter()
            .map(|site| (site, jump_delta(target, site)))
            .collect()
    }

    pub fn unresolved(&self) -> Vec<String> {
        self.pending.names().map(str::to_owned).collect()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct BindingConflict {
    pub name: String,
    pub bound_to: FunctionId,
    pub requested_by: FunctionId,
}

impl fmt::Display for BindingConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "subroutine '{}' is already a proto of function #{}, cannot also be used by function #{}",
            self.name, self.bound_to, self.requested_by
        )
    }
}

/// Which function owns each subroutine name as a proto. A subroutine is serialized inside
/// the function that references it, so it can only belong to one referencing function.
#[derive(Debug, Default)]
pub struct SubroutineBindings {
    owners: HashMap<String, FunctionId>,
}

impl SubroutineBindings {
    /// Returns `Ok(true)` the first time `name` is bound, `Ok(false)` on a repeat use by the
    /// same function.
    pub fn bind(&mut self, name: &str, user: FunctionId) -> Result<bool, BindingConflict> {
        let fresh = self.check(name, user)?;
        if fresh {
            self.owners.insert(name.to_owned(), user);
        }
        Ok(fresh)
    }

    /// Like `bind`, without recording anything.
    pub fn check(&self, name: &str, user: FunctionId) -> Result<bool, BindingConflict> {
        match self.owners.get(name) {
            None => Ok(true),
            Some(owner) if *owner == user => Ok(false),
            Some(owner) => Err(BindingConflict {
                name: name.to_owned(),
                bound_to: *owner,
                requested_by: user,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backward_reference() {
        let mut labels = Labels::default();
        assert!(labels.declare("top", 2).is_empty());
        assert_eq!(labels.resolved("top", 5), Some(-4));
        assert!(labels.unresolved().is_empty());
    }

    #[test]
    fn forward_references_resolve_together() {
        let mut labels = Labels::default();
        labels.defer("skip", 0);
        labels.defer("other", 1);
        labels.defer("skip", 2);
        assert_eq!(labels.unresolved(), vec!["skip", "other"]);
        assert_eq!(labels.pending("skip"), &[0, 2]);
        assert!(labels.pending("nowhere").is_empty());

        assert_eq!(labels.declare("skip", 4), vec![(0, 3), (2, 1)]);
        assert_eq!(labels.unresolved(), vec!["other"]);
    }

    #[test]
    fn lookups_do_not_queue_patches() {
        let mut labels = Labels::default();
        assert_eq!(labels.resolved("l", 0), None);
        assert!(labels.unresolved().is_empty());
        labels.declare("l", 2);
        assert_eq!(labels.resolved("l", 4), Some(-3));
    }

    #[test]
    fn redeclaration_only_affects_later_references() {
        let mut labels = Labels::default();
        labels.defer("l", 0);
        assert_eq!(labels.declare("l", 1), vec![(0, 0)]);
        assert!(labels.declare("l", 3).is_empty());
        assert_eq!(labels.resolved("l", 5), Some(-3));
    }

    #[test]
    fn take_removes_bucket() {
        let mut patches = Patches::default();
        patches.defer("f", 1);
        patches.defer("g", 2);
        patches.defer("f", 3);
        assert_eq!(patches.take("f"), vec![1, 3]);
        assert!(patches.take("f").is_empty());
        assert_eq!(patches.names().collect::<Vec<_>>(), vec!["g"]);
        assert!(!patches.is_empty());
    }

    #[test]
    fn bindings_conflict_across_functions() {
        let mut bindings = SubroutineBindings::default();
        assert_eq!(bindings.check("f", FunctionId(1)), Ok(true));
        assert_eq!(bindings.bind("f", FunctionId(0)), Ok(true));
        assert_eq!(bindings.bind("f", FunctionId(0)), Ok(false));
        assert_eq!(
            bindings.bind("f", FunctionId(1)),
            Err(BindingConflict {
                name: "f".to_owned(),
                bound_to: FunctionId(0),
                requested_by: FunctionId(1),
            })
        );
    }
}
