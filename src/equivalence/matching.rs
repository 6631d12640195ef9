// Maximum-weight bipartite matching (Hungarian algorithm)
//
// Pairs resources present on only one side of a comparison with their most
// similar counterpart on the other side. Admissible pairs carry a weight of
// `bonus + similarity` with `bonus` larger than any achievable similarity
// total, so the optimum always has the largest possible number of pairs and,
// among those, the highest total similarity.

/// A matched (row, column) pair and its similarity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assignment {
    pub row: usize,
    pub col: usize,
    pub similarity: f64,
}

/// Best matching over a `rows × cols` similarity matrix
///
/// Only pairs with `similarity >= threshold` (and above zero) can match.
/// Result is sorted by row.
pub fn best_matching(similarity: &[Vec<f64>], threshold: f64) -> Vec<Assignment> {
    let rows = similarity.len();
    let cols = similarity.first().map_or(0, Vec::len);
    if rows == 0 || cols == 0 {
        return Vec::new();
    }

    let admissible = |s: f64| s >= threshold && s > 0.0;
    if !similarity.iter().flatten().any(|&s| admissible(s)) {
        return Vec::new();
    }

    // The solver needs rows <= cols
    let transpose = rows > cols;
    let (n, m) = if transpose { (cols, rows) } else { (rows, cols) };
    let at = |i: usize, j: usize| {
        if transpose {
            similarity[j][i]
        } else {
            similarity[i][j]
        }
    };
    let bonus = n as f64 + 1.0;
    let cost = |i: usize, j: usize| {
        let s = at(i, j);
        if admissible(s) {
            -(bonus + s)
        } else {
            0.0
        }
    };

    let assigned = hungarian(n, m, cost);

    let mut pairs: Vec<Assignment> = assigned
        .into_iter()
        .filter_map(|(i, j)| {
            let s = at(i, j);
            if !admissible(s) {
                return None;
            }
            let (row, col) = if transpose { (j, i) } else { (i, j) };
            Some(Assignment {
                row,
                col,
                similarity: s,
            })
        })
        .collect();
    pairs.sort_by_key(|a| (a.row, a.col));
    pairs
}

/// Minimum-cost assignment of every row to a distinct column (`n <= m`)
///
/// Shortest augmenting path formulation with row/column potentials,
/// `O(n² m)`. Returns (row, column) pairs.
fn hungarian(n: usize, m: usize, cost: impl Fn(usize, usize) -> f64) -> Vec<(usize, usize)> {
    // 1-based; index 0 is the virtual source
    let mut u = vec![0.0_f64; n + 1];
    let mut v = vec![0.0_f64; m + 1];
    let mut owner = vec![0_usize; m + 1];
    let mut way = vec![0_usize; m + 1];

    for row in 1..=n {
        owner[0] = row;
        let mut j0 = 0;
        let mut min_slack = vec![f64::INFINITY; m + 1];
        let mut used = vec![false; m + 1];

        loop {
            used[j0] = true;
            let i0 = owner[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0;
            for j in 1..=m {
                if used[j] {
                    continue;
                }
                let reduced = cost(i0 - 1, j - 1) - u[i0] - v[j];
                if reduced < min_slack[j] {
                    min_slack[j] = reduced;
                    way[j] = j0;
                }
                if min_slack[j] < delta {
                    delta = min_slack[j];
                    j1 = j;
                }
            }
            for j in 0..=m {
                if used[j] {
                    u[owner[j]] += delta;
                    v[j] -= delta;
                } else {
                    min_slack[j] -= delta;
                }
            }
            j0 = j1;
            if owner[j0] == 0 {
                break;
            }
        }

        // Flip the augmenting path
        loop {
            let j1 = way[j0];
            owner[j0] = owner[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    (1..=m)
        .filter(|&j| owner[j] != 0)
        .map(|j| (owner[j] - 1, j - 1))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_inputs() {
        assert!(best_matching(&[], 0.5).is_empty());
        assert!(best_matching(&[vec![]], 0.5).is_empty());
    }

    #[test]
    fn test_prefers_higher_total_similarity() {
        // Greedy would take (0,0)=0.9 and leave row 1 with 0.1
        let sim = vec![vec![0.9, 0.8], vec![0.85, 0.1]];
        let pairs = best_matching(&sim, 0.0);
        assert_eq!(pairs.len(), 2);
        assert_eq!((pairs[0].row, pairs[0].col), (0, 1));
        assert_eq!((pairs[1].row, pairs[1].col), (1, 0));
    }

    #[test]
    fn test_cardinality_beats_similarity() {
        // One perfect pair vs two decent pairs: two pairs win
        let sim = vec![vec![1.0, 0.75], vec![0.75, 0.0]];
        let pairs = best_matching(&sim, 0.7);
        assert_eq!(pairs.len(), 2);
    }

    #[test]
    fn test_threshold_excludes_pairs() {
        let sim = vec![vec![0.5, 0.2], vec![0.1, 0.95]];
        let pairs = best_matching(&sim, 0.7);
        assert_eq!(pairs.len(), 1);
        assert_eq!((pairs[0].row, pairs[0].col), (1, 1));
        assert_eq!(pairs[0].similarity, 0.95);
    }

    #[test]
    fn test_rectangular_both_orientations() {
        let wide = vec![vec![0.1, 0.9, 0.8]];
        let pairs = best_matching(&wide, 0.5);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].col, 1);

        let tall = vec![vec![0.1], vec![0.9], vec![0.8]];
        let pairs = best_matching(&tall, 0.5);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].row, 1);
        assert_eq!(pairs[0].col, 0);
    }

    #[test]
    fn test_no_admissible_pairs() {
        let sim = vec![vec![0.1, 0.2], vec![0.3, 0.0]];
        assert!(best_matching(&sim, 0.7).is_empty());
    }
}
