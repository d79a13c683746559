/// Visits the `size`-element subsets of `items` in lexicographic order and
/// returns the first result `visit` produces
pub(crate) fn first_subset<T>(
    items: &[usize],
    size: usize,
    mut visit: impl FnMut(&[usize]) -> Option<T>,
) -> Option<T> {
    fn walk<T>(
        items: &[usize],
        size: usize,
        start: usize,
        chosen: &mut Vec<usize>,
        visit: &mut dyn FnMut(&[usize]) -> Option<T>,
    ) -> Option<T> {
        if chosen.len() == size {
            return visit(chosen);
        }
        for i in start..items.len() {
            if items.len() - i < size - chosen.len() {
                break;
            }
            chosen.push(items[i]);
            let found = walk(items, size, i + 1, chosen, visit);
            chosen.pop();
            if found.is_some() {
                return found;
            }
        }
        None
    }
    if size > items.len() {
        return None;
    }
    walk(items, size, 0, &mut Vec::with_capacity(size), &mut visit)
}
