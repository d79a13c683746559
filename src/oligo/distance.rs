//! Edit-distance primitives over nucleotide slices

use super::Nt;

/// Levenshtein distance between two sequences
#[must_use]
pub fn distance(a: &[Nt], b: &[Nt]) -> usize {
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0; b.len() + 1];
    for (i, &x) in a.iter().enumerate() {
        cur[0] = i + 1;
        for (j, &y) in b.iter().enumerate() {
            let sub = prev[j] + usize::from(x != y);
            cur[j + 1] = sub.min(prev[j + 1] + 1).min(cur[j] + 1);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

/// Levenshtein distance if it is at most `maxdist`
///
/// Stops as soon as a whole DP row exceeds `maxdist`.
#[must_use]
pub fn distance_within(a: &[Nt], b: &[Nt], maxdist: usize) -> Option<usize> {
    if a.len().abs_diff(b.len()) > maxdist {
        return None;
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0; b.len() + 1];
    for (i, &x) in a.iter().enumerate() {
        cur[0] = i + 1;
        let mut rowmin = cur[0];
        for (j, &y) in b.iter().enumerate() {
            let sub = prev[j] + usize::from(x != y);
            cur[j + 1] = sub.min(prev[j + 1] + 1).min(cur[j] + 1);
            rowmin = rowmin.min(cur[j + 1]);
        }
        if rowmin > maxdist {
            return None;
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    let d = prev[b.len()];
    (d <= maxdist).then_some(d)
}

/// Finds `pattern` anywhere inside `text` with at most `maxerr` edits
///
/// Returns `(pos, matched_len)`, the start offset in `text` and the number of
/// text nucleotides the match spans (which differs from the pattern length when
/// the match contains insertions or deletions). Among equal-cost matches the one
/// starting closest to `hint` wins. `None` means no match within tolerance.
#[must_use]
pub fn find(text: &[Nt], pattern: &[Nt], maxerr: usize, hint: usize) -> Option<(usize, usize)> {
    if pattern.is_empty() {
        return Some((hint.min(text.len()), 0));
    }

    // (cost, start) per text column; the first row allows a free start anywhere
    let mut prev: Vec<(usize, usize)> = (0..=text.len()).map(|j| (0, j)).collect();
    let mut cur = vec![(0usize, 0usize); text.len() + 1];
    for (i, &p) in pattern.iter().enumerate() {
        cur[0] = (i + 1, 0);
        for (j, &t) in text.iter().enumerate() {
            let diag = (prev[j].0 + usize::from(p != t), prev[j].1);
            let up = (prev[j + 1].0 + 1, prev[j + 1].1);
            let left = (cur[j].0 + 1, cur[j].1);
            let mut best = diag;
            if up.0 < best.0 {
                best = up;
            }
            if left.0 < best.0 {
                best = left;
            }
            cur[j + 1] = best;
        }
        std::mem::swap(&mut prev, &mut cur);
    }

    let mut best: Option<(usize, usize, usize)> = None; // (cost, start, end)
    for (end, &(cost, start)) in prev.iter().enumerate() {
        if cost > maxerr || end < start {
            continue;
        }
        let better = match best {
            None => true,
            Some((bcost, bstart, _)) => {
                cost < bcost || (cost == bcost && start.abs_diff(hint) < bstart.abs_diff(hint))
            }
        };
        if better {
            best = Some((cost, start, end));
        }
    }
    best.map(|(_, start, end)| (start, end - start))
}

/// Aligns `pattern` against the beginning of `text` with at most `maxerr` edits
///
/// The match is anchored at offset 0. Returns the number of text nucleotides
/// covered by the best alignment; ties prefer a span close to the pattern length.
#[must_use]
pub fn find_prefix(text: &[Nt], pattern: &[Nt], maxerr: usize) -> Option<usize> {
    let mut prev: Vec<usize> = (0..=text.len()).collect();
    let mut cur = vec![0; text.len() + 1];
    for (i, &p) in pattern.iter().enumerate() {
        cur[0] = i + 1;
        for (j, &t) in text.iter().enumerate() {
            let sub = prev[j] + usize::from(p != t);
            cur[j + 1] = sub.min(prev[j + 1] + 1).min(cur[j] + 1);
        }
        std::mem::swap(&mut prev, &mut cur);
    }

    let target = pattern.len();
    prev.iter()
        .enumerate()
        .filter(|(_, &cost)| cost <= maxerr)
        .min_by_key(|(end, &cost)| (cost, end.abs_diff(target)))
        .map(|(end, _)| end)
}

/// Minimum edit script between two sequences
///
/// Returns the edit cost and a string with one operation per alignment column:
/// `-` match, `R` replacement, `I` insertion (present only in `to`),
/// `D` deletion (present only in `from`).
#[must_use]
pub fn diff(from: &[Nt], to: &[Nt]) -> (usize, String) {
    let (n, m) = (from.len(), to.len());
    let mut dp = vec![vec![0usize; m + 1]; n + 1];
    for (i, row) in dp.iter_mut().enumerate() {
        row[0] = i;
    }
    for j in 0..=m {
        dp[0][j] = j;
    }
    for i in 1..=n {
        for j in 1..=m {
            let sub = dp[i - 1][j - 1] + usize::from(from[i - 1] != to[j - 1]);
            dp[i][j] = sub.min(dp[i - 1][j] + 1).min(dp[i][j - 1] + 1);
        }
    }

    let mut ops = Vec::with_capacity(n.max(m));
    let (mut i, mut j) = (n, m);
    while i > 0 || j > 0 {
        if i > 0 && j > 0 && dp[i][j] == dp[i - 1][j - 1] + usize::from(from[i - 1] != to[j - 1]) {
            ops.push(if from[i - 1] == to[j - 1] { '-' } else { 'R' });
            i -= 1;
            j -= 1;
        } else if i > 0 && dp[i][j] == dp[i - 1][j] + 1 {
            ops.push('D');
            i -= 1;
        } else {
            ops.push('I');
            j -= 1;
        }
    }
    ops.reverse();
    (dp[n][m], ops.into_iter().collect())
}
