// Copyright 2025 John Brosnihan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Vertex welding
//!
//! Collapses a flat vertex buffer into unique vertices plus an index remap.
//! Candidates are found by sorting along the axis of largest spread and
//! only comparing vertices inside a small swept window on that axis, so the
//! cost stays close to `n log n` for typical meshes.

/// Largest cluster sorted as a single batch before splitting
const CLUSTER_SIZE: usize = 1024;

/// Cap on the split stack depth
const MAX_SPLIT_DEPTH: usize = 124;

#[derive(Clone, Copy)]
struct Cluster {
    start: usize,
    count: usize,
    sum: [f64; 3],
    sum2: [f64; 3],
}

impl Cluster {
    fn mean_and_variance(&self) -> ([f64; 3], [f64; 3]) {
        let inv = 1.0 / self.count as f64;
        let mut mean = [0.0; 3];
        let mut variance = [0.0; 3];
        for axis in 0..3 {
            mean[axis] = self.sum[axis] * inv;
            variance[axis] = (self.sum2[axis] * inv - mean[axis] * mean[axis]).max(0.0);
        }
        (mean, variance)
    }
}

fn widest_axis(spread: &[f64; 3]) -> usize {
    if spread[1] >= spread[0] && spread[1] >= spread[2] {
        1
    } else if spread[2] >= spread[0] && spread[2] >= spread[1] {
        2
    } else {
        0
    }
}

/// Weld duplicate vertices of a flat `f64` buffer
///
/// `vertices` holds `vertices.len() / stride` vertices of `stride` values
/// each; the first three values are the position. Two vertices are merged
/// when their first `compare_count` values all differ by at most
/// `tolerance`.
///
/// On return the first `count * stride` values of `vertices` hold the unique
/// vertices, in order of first occurrence, and the returned remap gives the
/// unique index of every input vertex. A buffer without duplicates is left
/// unchanged and maps to the identity.
///
/// Returns `(0, vec![])` when `stride < 3` or `compare_count < 3`.
///
/// # Examples
///
/// ```
/// use rigid_dynamics::math::vertex_list_to_index_list;
///
/// let mut verts = vec![
///     0.0, 0.0, 0.0,
///     1.0, 0.0, 0.0,
///     0.0, 0.0, 0.0,
/// ];
/// let (count, remap) = vertex_list_to_index_list(&mut verts, 3, 3, 1e-6);
/// assert_eq!(count, 2);
/// assert_eq!(remap, vec![0, 1, 0]);
/// ```
pub fn vertex_list_to_index_list(
    vertices: &mut [f64],
    stride: usize,
    compare_count: usize,
    tolerance: f64,
) -> (usize, Vec<usize>) {
    if stride < 3 || compare_count < 3 {
        return (0, Vec::new());
    }
    let compare_count = compare_count.min(stride);
    let vertex_count = vertices.len() / stride;
    if vertex_count == 0 {
        return (0, Vec::new());
    }

    let source = vertices[..vertex_count * stride].to_vec();
    let component = |vertex: usize, axis: usize| source[vertex * stride + axis];

    let mut order: Vec<usize> = (0..vertex_count).collect();
    let mut group_of: Vec<Option<usize>> = vec![None; vertex_count];
    let mut group_count = 0usize;

    let mut root = Cluster {
        start: 0,
        count: vertex_count,
        sum: [0.0; 3],
        sum2: [0.0; 3],
    };
    for i in 0..vertex_count {
        for axis in 0..3 {
            let x = component(i, axis);
            root.sum[axis] += x;
            root.sum2[axis] += x * x;
        }
    }

    let mut stack = vec![root];
    while let Some(cluster) = stack.pop() {
        let (mean, variance) = cluster.mean_and_variance();
        let max_variance = variance[0].max(variance[1]).max(variance[2]);
        let slice = &mut order[cluster.start..cluster.start + cluster.count];

        if cluster.count <= CLUSTER_SIZE || stack.len() > MAX_SPLIT_DEPTH || max_variance < 4.0 {
            weld_cluster(
                slice,
                &source,
                stride,
                compare_count,
                tolerance,
                &variance,
                &mut group_of,
                &mut group_count,
            );
            continue;
        }

        // split around the mean of the widest axis
        let axis = widest_axis(&variance);
        let pivot = mean[axis];
        let mut left = 0usize;
        for i in 0..slice.len() {
            if component(slice[i], axis) <= pivot {
                slice.swap(i, left);
                left += 1;
            }
        }
        if left == 0 || left == slice.len() {
            weld_cluster(
                slice,
                &source,
                stride,
                compare_count,
                tolerance,
                &variance,
                &mut group_of,
                &mut group_count,
            );
            continue;
        }

        let mut low = Cluster {
            start: cluster.start,
            count: left,
            sum: [0.0; 3],
            sum2: [0.0; 3],
        };
        for &v in &slice[..left] {
            for a in 0..3 {
                let x = component(v, a);
                low.sum[a] += x;
                low.sum2[a] += x * x;
            }
        }
        let mut high = Cluster {
            start: cluster.start + left,
            count: cluster.count - left,
            sum: cluster.sum,
            sum2: cluster.sum2,
        };
        for a in 0..3 {
            high.sum[a] -= low.sum[a];
            high.sum2[a] -= low.sum2[a];
        }
        stack.push(high);
        stack.push(low);
    }

    // unique vertices are emitted in order of their first occurrence
    let mut first_seen: Vec<usize> = vec![usize::MAX; group_count];
    for (vertex, group) in group_of.iter().enumerate() {
        if let Some(g) = *group {
            first_seen[g] = first_seen[g].min(vertex);
        }
    }
    let mut groups: Vec<usize> = (0..group_count).collect();
    groups.sort_by_key(|&g| first_seen[g]);
    let mut new_index = vec![0usize; group_count];
    for (slot, &g) in groups.iter().enumerate() {
        new_index[g] = slot;
        let src = first_seen[g] * stride;
        let dst = slot * stride;
        vertices[dst..dst + stride].copy_from_slice(&source[src..src + stride]);
    }

    let remap = group_of
        .iter()
        .map(|group| group.map(|g| new_index[g]).unwrap_or(0))
        .collect();
    (group_count, remap)
}

#[allow(clippy::too_many_arguments)]
fn weld_cluster(
    order: &mut [usize],
    source: &[f64],
    stride: usize,
    compare_count: usize,
    tolerance: f64,
    variance: &[f64; 3],
    group_of: &mut [Option<usize>],
    group_count: &mut usize,
) {
    let spread = [variance[0].sqrt(), variance[1].sqrt(), variance[2].sqrt()];
    let axis = widest_axis(&spread);
    order.sort_by(|&a, &b| {
        source[a * stride + axis]
            .partial_cmp(&source[b * stride + axis])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let min_spread = spread[0].min(spread[1]).min(spread[2]);
    let window = 2.0 * min_spread.min(tolerance).max(1.0e-8);

    for i in 0..order.len() {
        let vi = order[i];
        if group_of[vi].is_some() {
            continue;
        }
        let group = *group_count;
        *group_count += 1;
        group_of[vi] = Some(group);

        let swept = source[vi * stride + axis] + window;
        for &vj in &order[i + 1..] {
            if source[vj * stride + axis] >= swept {
                break;
            }
            if group_of[vj].is_some() {
                continue;
            }
            let same = (0..compare_count)
                .all(|t| (source[vi * stride + t] - source[vj * stride + t]).abs() <= tolerance);
            if same {
                group_of[vj] = Some(group);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_short_stride() {
        let mut verts = vec![0.0; 6];
        assert_eq!(vertex_list_to_index_list(&mut verts, 2, 3, 1e-6).0, 0);
        assert_eq!(vertex_list_to_index_list(&mut verts, 3, 2, 1e-6).0, 0);
    }

    #[test]
    fn test_welds_within_tolerance() {
        let mut verts = vec![
            1.0, 2.0, 3.0, //
            1.0000001, 2.0, 3.0, //
            5.0, 5.0, 5.0, //
            1.0, 2.0, 3.0000002,
        ];
        let (count, remap) = vertex_list_to_index_list(&mut verts, 3, 3, 1e-5);
        assert_eq!(count, 2);
        assert_eq!(remap, vec![0, 0, 1, 0]);
        assert_eq!(&verts[..6], &[1.0, 2.0, 3.0, 5.0, 5.0, 5.0]);
    }

    #[test]
    fn test_extra_attributes_can_keep_vertices_apart() {
        // same position, different uv
        let mut verts = vec![
            0.0, 0.0, 0.0, 0.0, 0.0, //
            0.0, 0.0, 0.0, 1.0, 0.0,
        ];
        let (count, _) = vertex_list_to_index_list(&mut verts, 5, 5, 1e-6);
        assert_eq!(count, 2);
        let (count, _) = vertex_list_to_index_list(&mut verts, 5, 3, 1e-6);
        assert_eq!(count, 1);
    }

    #[test]
    fn test_large_grid_splits_clusters() {
        let mut verts = Vec::new();
        for i in 0..40 {
            for j in 0..40 {
                verts.extend_from_slice(&[i as f64, 0.0, j as f64]);
            }
        }
        let unique = verts.len() / 3;
        // duplicate every vertex
        let copy = verts.clone();
        verts.extend_from_slice(&copy);
        let (count, remap) = vertex_list_to_index_list(&mut verts, 3, 3, 1e-6);
        assert_eq!(count, unique);
        for i in 0..unique {
            assert_eq!(remap[i], i);
            assert_eq!(remap[i + unique], i);
        }
    }
}
