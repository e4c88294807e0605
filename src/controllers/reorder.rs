/// Move the item at `from` so it ends up at `to`.
///
/// Other items keep their relative order. Returns false (and leaves the
/// list untouched) when either index is out of range or they are equal.
pub fn move_within<T>(list: &mut Vec<T>, from: usize, to: usize) -> bool {
    if from == to || from >= list.len() || to >= list.len() {
        return false;
    }
    let item = list.remove(from);
    list.insert(to, item);
    true
}

/// Move `src[from]` into `dst` at `to` (clamped to the end of `dst`)
pub fn move_across<T>(src: &mut Vec<T>, dst: &mut Vec<T>, from: usize, to: usize) -> bool {
    if from >= src.len() {
        return false;
    }
    let item = src.remove(from);
    let to = to.min(dst.len());
    dst.insert(to, item);
    true
}

/// Zero-based position for every item, in list order
pub fn position_updates<T, F>(list: &[T], id: F) -> Vec<(String, i64)>
where
    F: Fn(&T) -> &str,
{
    list.iter()
        .enumerate()
        .map(|(i, item)| (id(item).to_string(), i as i64))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_move_within_every_pair() {
        let n = 5;
        for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                let mut list: Vec<usize> = (0..n).collect();
                assert!(move_within(&mut list, i, j));
                assert_eq!(list[j], i);

                let mut sorted = list.clone();
                sorted.sort();
                assert_eq!(sorted, (0..n).collect::<Vec<_>>());

                let others: Vec<usize> = list.iter().copied().filter(|&x| x != i).collect();
                let expected: Vec<usize> = (0..n).filter(|&x| x != i).collect();
                assert_eq!(others, expected);
            }
        }
    }

    #[test]
    fn test_move_within_out_of_range_is_noop() {
        let mut list = vec!['a', 'b', 'c'];
        assert!(!move_within(&mut list, 0, 3));
        assert!(!move_within(&mut list, 5, 0));
        assert!(!move_within(&mut list, 1, 1));
        assert_eq!(list, vec!['a', 'b', 'c']);
    }

    #[test]
    fn test_move_across() {
        let mut src = vec!["a", "b", "c"];
        let mut dst = vec!["x", "y"];
        assert!(move_across(&mut src, &mut dst, 1, 1));
        assert_eq!(src, vec!["a", "c"]);
        assert_eq!(dst, vec!["x", "b", "y"]);

        assert!(move_across(&mut src, &mut dst, 0, 99));
        assert_eq!(dst, vec!["x", "b", "y", "a"]);
        assert!(!move_across(&mut src, &mut dst, 5, 0));
    }

    #[test]
    fn test_position_updates() {
        let list = vec![("s3", 1), ("s1", 2)];
        assert_eq!(
            position_updates(&list, |item| item.0),
            vec![("s3".to_string(), 0), ("s1".to_string(), 1)]
        );
    }
}
