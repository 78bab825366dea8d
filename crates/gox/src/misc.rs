// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Slice helpers

/// Elements of `list` for which `keep` returns true, in order
pub fn filter<T, F>(list: &[T], mut keep: F) -> Vec<T>
where
    T: Clone,
    F: FnMut(&T) -> bool,
{
    list.iter().filter(|item| keep(item)).cloned().collect()
}

/// `map` applied to every element of `list`, in order
pub fn extract<T, R, F>(list: &[T], map: F) -> Vec<R>
where
    F: FnMut(&T) -> R,
{
    list.iter().map(map).collect()
}

/// Whether `list` holds `target`
pub fn contain<T: PartialEq>(list: &[T], target: &T) -> bool {
    index(list, target).is_some()
}

/// Position of the first element equal to `target`
pub fn index<T: PartialEq>(list: &[T], target: &T) -> Option<usize> {
    list.iter().position(|item| item == target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_keeps_order() {
        let evens = filter(&[1, 2, 3, 4, 5, 6], |n| n % 2 == 0);
        assert_eq!(evens, vec![2, 4, 6]);
    }

    #[test]
    fn filter_of_nothing_is_empty() {
        let none: Vec<i32> = filter(&[], |_| true);
        assert!(none.is_empty());
        assert!(filter(&["a", "b"], |_| false).is_empty());
    }

    #[test]
    fn extract_maps_every_element() {
        let names = ["ada", "grace"];
        assert_eq!(extract(&names, |name| name.len()), vec![3, 5]);
        assert_eq!(
            extract(&names, |name| name.to_uppercase()),
            vec!["ADA".to_string(), "GRACE".to_string()]
        );
    }

    #[test]
    fn index_finds_first_match() {
        let list = ["x", "y", "x"];
        assert_eq!(index(&list, &"x"), Some(0));
        assert_eq!(index(&list, &"y"), Some(1));
        assert_eq!(index(&list, &"z"), None);
        assert_eq!(index::<i32>(&[], &1), None);
    }

    #[test]
    fn contain_matches_index() {
        let list = [10, 20, 30];
        assert!(contain(&list, &20));
        assert!(!contain(&list, &40));
    }
}
