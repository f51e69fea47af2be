use std::fmt::Debug;

/// Assert that two vectors contain the same elements, ignoring order.
#[track_caller]
pub fn assert_unordered_vec_eq<T: Ord + Debug>(mut lhs: Vec<T>, mut rhs: Vec<T>) {
    lhs.sort();
    rhs.sort();
    assert_eq!(lhs, rhs, "Vectors differ (compared after sorting)");
}
