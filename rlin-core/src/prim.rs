// Minimum-spanning-tree traversal order
// Orders a batch so every emitted profile sits next to its nearest neighbor
// among those already emitted, Prim style, over the batch distance matrix.

use crate::matrix::DistanceMatrix;
use rlin_common::INF_DISTANCE;

/// Produce the traversal order for a batch.
///
/// The matrix is consumed as working storage: the diagonal and every cell
/// between two visited members are overwritten with `INF_DISTANCE`.
///
/// Ties always resolve to the smallest row-major flat index, so the order
/// is deterministic for a given matrix.
pub fn prim_order(matrix: &mut DistanceMatrix) -> Vec<usize> {
    let n = matrix.size();
    if n <= 1 {
        return (0..n).collect();
    }

    for i in 0..n {
        matrix.set(i, i, INF_DISTANCE);
    }

    // Globally smallest cell seeds the traversal with both endpoints
    let mut best = f64::INFINITY;
    let (mut x, mut y) = (0, 0);
    for i in 0..n {
        for j in 0..n {
            let d = matrix.get(i, j);
            if d < best {
                best = d;
                x = i;
                y = j;
            }
        }
    }
    assert!(
        best < INF_DISTANCE,
        "no finite distance found when seeding the traversal"
    );

    let mut order = Vec::with_capacity(n);
    let mut visited = vec![false; n];
    order.push(x);
    order.push(y);
    visited[x] = true;
    visited[y] = true;
    matrix.set(x, y, INF_DISTANCE);
    matrix.set(y, x, INF_DISTANCE);

    while order.len() < n {
        // Smallest remaining entry across all visited rows; cells toward
        // already-visited columns are INF, so the minimum lands on a new
        // member.
        let mut best = f64::INFINITY;
        let mut next = 0;
        for i in 0..n {
            if !visited[i] {
                continue;
            }
            for j in 0..n {
                let d = matrix.get(i, j);
                if d < best {
                    best = d;
                    next = j;
                }
            }
        }
        assert!(
            best < INF_DISTANCE,
            "traversal ran out of reachable profiles with {} of {} emitted",
            order.len(),
            n
        );

        order.push(next);
        visited[next] = true;
        for i in 0..n {
            if visited[i] {
                matrix.set(i, next, INF_DISTANCE);
                matrix.set(next, i, INF_DISTANCE);
            }
        }
    }

    order
}
