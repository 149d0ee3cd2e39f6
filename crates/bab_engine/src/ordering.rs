//! Output ordering of a stream's instances.
//!
//! Both orders place every instance after everything it transitively depends on.
//! The simple order sorts by dependency count. The stable order keeps the layout
//! of a base patch stream and inserts new instances where they disturb it least.

use bab_common::{BuildError, BuildResult, ErrorCode, InstanceHandle};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

/// One instance to be ordered.
#[derive(Clone, Copy, Debug)]
pub struct OrderItem<'a> {
    /// Identity.
    pub handle: &'a InstanceHandle,
    /// Transitive strong dependencies within the stream.
    pub dependents: &'a BTreeSet<InstanceHandle>,
    /// How many asset types the schema lets the type reference.
    pub dependency_count: usize,
}

impl OrderItem<'_> {
    fn depends_on(&self, other: &OrderItem<'_>) -> bool {
        self.dependents.contains(other.handle)
    }
}

fn circular(a: &InstanceHandle, b: &InstanceHandle) -> BuildError {
    BuildError::new(
        ErrorCode::CircularDependency,
        format!(
            "Circular dependency detected between {} and {}",
            a.name(),
            b.name()
        ),
    )
}

fn compare_names(a: &InstanceHandle, b: &InstanceHandle) -> Ordering {
    a.type_name()
        .cmp(b.type_name())
        .then_with(|| {
            a.instance_name()
                .to_lowercase()
                .cmp(&b.instance_name().to_lowercase())
        })
}

/// Orders by dependency set size, then dependency, then name.
pub fn simple_order(items: &[OrderItem<'_>]) -> BuildResult<Vec<usize>> {
    let failure = RefCell::new(None);
    let mut order: Vec<usize> = (0..items.len()).collect();
    order.sort_by(|&x, &y| {
        let (a, b) = (&items[x], &items[y]);
        a.dependents
            .len()
            .cmp(&b.dependents.len())
            .then_with(|| match (a.depends_on(b), b.depends_on(a)) {
                (true, true) => {
                    failure
                        .borrow_mut()
                        .get_or_insert_with(|| circular(a.handle, b.handle));
                    Ordering::Equal
                }
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => Ordering::Equal,
            })
            .then_with(|| compare_names(a.handle, b.handle))
    });
    match failure.into_inner() {
        Some(err) => Err(err),
        None => Ok(order),
    }
}

/// Orders starting from `base_order`, inserting the remaining instances one at a time.
pub fn stable_order(items: &[OrderItem<'_>], base_order: &[InstanceHandle]) -> BuildResult<Vec<usize>> {
    let index: HashMap<&InstanceHandle, usize> =
        items.iter().enumerate().map(|(i, it)| (it.handle, i)).collect();
    let mut result = Vec::with_capacity(items.len());
    let mut placed = vec![false; items.len()];
    for handle in base_order {
        if let Some(&i) = index.get(handle) {
            if !placed[i] {
                placed[i] = true;
                result.push(i);
            }
        }
    }
    let seeded = result.len();

    let mut remaining: Vec<usize> = (0..items.len()).filter(|&i| !placed[i]).collect();
    remaining.sort_by(|&x, &y| compare_names(items[x].handle, items[y].handle));
    for i in remaining {
        let at = insert_position(items, &result, i);
        result.insert(at, i);
    }
    tracing::debug!(
        seeded,
        total = result.len(),
        "stable order built from base stream layout"
    );
    repair(items, &result)
}

/// The latest position that keeps `i` after its dependencies, before its dependents,
/// and not directly after an instance it sorts before.
fn insert_position(items: &[OrderItem<'_>], result: &[usize], i: usize) -> usize {
    let item = &items[i];
    let lower = result
        .iter()
        .rposition(|&j| item.depends_on(&items[j]))
        .map_or(0, |p| p + 1);
    let upper = result
        .iter()
        .position(|&j| items[j].depends_on(item))
        .unwrap_or(result.len());
    if lower >= upper {
        return lower.min(result.len());
    }
    (lower..=upper)
        .rev()
        .find(|&p| p == lower || !sorts_before(item, &items[result[p - 1]]))
        .unwrap_or(lower)
}

fn sorts_before(item: &OrderItem<'_>, other: &OrderItem<'_>) -> bool {
    if item.handle.type_id() == other.handle.type_id() {
        compare_names(item.handle, other.handle) == Ordering::Less
    } else {
        item.dependency_count < other.dependency_count
    }
}

/// Moves instances forward only as far as their dependencies require.
fn repair(items: &[OrderItem<'_>], order: &[usize]) -> BuildResult<Vec<usize>> {
    let position: HashMap<usize, usize> = order.iter().enumerate().map(|(p, &i)| (i, p)).collect();
    let mut pending: Vec<usize> = vec![0; items.len()];
    let mut waiting: Vec<Vec<usize>> = vec![Vec::new(); items.len()];
    for &i in order {
        for &j in order {
            if i != j && items[i].depends_on(&items[j]) {
                pending[i] += 1;
                waiting[j].push(i);
            }
        }
    }
    let mut ready: BTreeSet<(usize, usize)> = order
        .iter()
        .filter(|&&i| pending[i] == 0)
        .map(|&i| (position[&i], i))
        .collect();
    let mut out = Vec::with_capacity(order.len());
    while let Some((_, i)) = ready.pop_first() {
        out.push(i);
        for &k in &waiting[i] {
            pending[k] -= 1;
            if pending[k] == 0 {
                ready.insert((position[&k], k));
            }
        }
    }
    if out.len() != order.len() {
        let stuck: Vec<usize> = order.iter().copied().filter(|i| pending[*i] > 0).collect();
        let a = items[stuck[0]].handle;
        let b = stuck
            .iter()
            .map(|&k| items[k].handle)
            .find(|h| items[stuck[0]].dependents.contains(*h))
            .unwrap_or(a);
        return Err(circular(a, b));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        handles: Vec<InstanceHandle>,
        deps: Vec<BTreeSet<InstanceHandle>>,
        counts: Vec<usize>,
    }

    impl Fixture {
        fn new(rows: &[(&str, &str, &[usize], usize)]) -> Self {
            let handles: Vec<InstanceHandle> = rows
                .iter()
                .map(|(t, i, _, _)| InstanceHandle::new(*t, *i))
                .collect();
            let deps = rows
                .iter()
                .map(|(_, _, d, _)| d.iter().map(|&k| handles[k].clone()).collect())
                .collect();
            let counts = rows.iter().map(|s| s.3).collect();
            Self {
                handles,
                deps,
                counts,
            }
        }

        fn items(&self) -> Vec<OrderItem<'_>> {
            (0..self.handles.len())
                .map(|i| OrderItem {
                    handle: &self.handles[i],
                    dependents: &self.deps[i],
                    dependency_count: self.counts[i],
                })
                .collect()
        }

        fn names(&self, order: &[usize]) -> Vec<String> {
            order.iter().map(|&i| self.handles[i].name()).collect()
        }
    }

    #[test]
    fn simple_puts_dependencies_first() {
        // c -> b -> a
        let f = Fixture::new(&[
            ("Unit", "c", &[1, 2], 0),
            ("Weapon", "b", &[2], 0),
            ("Weapon", "a", &[], 0),
        ]);
        let order = simple_order(&f.items()).unwrap();
        assert_eq!(f.names(&order), ["Weapon:a", "Weapon:b", "Unit:c"]);
    }

    #[test]
    fn simple_ties_break_by_name() {
        let f = Fixture::new(&[("Weapon", "b", &[], 0), ("Armor", "z", &[], 0), ("Weapon", "A", &[], 0)]);
        let order = simple_order(&f.items()).unwrap();
        assert_eq!(f.names(&order), ["Armor:z", "Weapon:A", "Weapon:b"]);
    }

    #[test]
    fn mutual_dependency_is_circular() {
        let f = Fixture::new(&[("T", "a", &[1], 0), ("T", "b", &[0], 0)]);
        let err = simple_order(&f.items()).unwrap_err();
        assert_eq!(err.code, ErrorCode::CircularDependency);
        let err = stable_order(&f.items(), &[]).unwrap_err();
        assert_eq!(err.code, ErrorCode::CircularDependency);
    }

    #[test]
    fn stable_keeps_base_layout() {
        let f = Fixture::new(&[
            ("Weapon", "a", &[], 0),
            ("Weapon", "c", &[], 0),
            ("Weapon", "b", &[], 0),
        ]);
        let base = vec![f.handles[1].clone(), f.handles[0].clone()];
        let order = stable_order(&f.items(), &base).unwrap();
        // Base order c, a is kept; b goes after a.
        assert_eq!(f.names(&order), ["Weapon:c", "Weapon:a", "Weapon:b"]);
    }

    #[test]
    fn stable_respects_dependencies() {
        // u depends on w; the base stream has u first.
        let f = Fixture::new(&[("Unit", "u", &[1], 1), ("Weapon", "w", &[], 0)]);
        let base = vec![f.handles[0].clone()];
        let order = stable_order(&f.items(), &base).unwrap();
        assert_eq!(f.names(&order), ["Weapon:w", "Unit:u"]);
    }

    #[test]
    fn stable_uses_dependency_count_between_types() {
        let f = Fixture::new(&[("Unit", "u", &[], 3), ("Weapon", "w", &[], 1)]);
        let order = stable_order(&f.items(), &[]).unwrap();
        assert_eq!(f.names(&order), ["Weapon:w", "Unit:u"]);
    }
}
