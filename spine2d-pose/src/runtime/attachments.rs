use super::skeleton::{Bone, Skeleton};
use crate::{AttachmentData, MeshVertices, PointAttachmentData, RegionAttachmentData};

impl PointAttachmentData {
    pub fn compute_world_position(&self, bone: &Bone) -> [f32; 2] {
        bone.local_to_world(self.x, self.y)
    }

    pub fn compute_world_rotation(&self, bone: &Bone) -> f32 {
        let (sin, cos) = self.rotation.to_radians().sin_cos();
        let x = cos * bone.a + sin * bone.b;
        let y = cos * bone.c + sin * bone.d;
        y.atan2(x).to_degrees()
    }
}

impl RegionAttachmentData {
    /// Quad corners in attachment space, ordered bottom-right, bottom-left, upper-left,
    /// upper-right.
    pub fn local_vertices(&self) -> [[f32; 2]; 4] {
        let local_x = -self.width * 0.5 * self.scale_x;
        let local_y = -self.height * 0.5 * self.scale_y;
        let local_x2 = self.width * 0.5 * self.scale_x;
        let local_y2 = self.height * 0.5 * self.scale_y;

        let (sin, cos) = self.rotation.to_radians().sin_cos();
        let local_x_cos = local_x * cos + self.x;
        let local_x_sin = local_x * sin;
        let local_y_cos = local_y * cos + self.y;
        let local_y_sin = local_y * sin;
        let local_x2_cos = local_x2 * cos + self.x;
        let local_x2_sin = local_x2 * sin;
        let local_y2_cos = local_y2 * cos + self.y;
        let local_y2_sin = local_y2 * sin;

        [
            [local_x2_cos - local_y_sin, local_y_cos + local_x2_sin],
            [local_x_cos - local_y_sin, local_y_cos + local_x_sin],
            [local_x_cos - local_y2_sin, local_y2_cos + local_x_sin],
            [local_x2_cos - local_y2_sin, local_y2_cos + local_x2_sin],
        ]
    }

    pub fn compute_world_vertices(&self, bone: &Bone) -> [f32; 8] {
        let mut out = [0.0; 8];
        for (i, [x, y]) in self.local_vertices().into_iter().enumerate() {
            let [wx, wy] = bone.local_to_world(x, y);
            out[i * 2] = wx;
            out[i * 2 + 1] = wy;
        }
        out
    }
}

impl Skeleton {
    /// World positions of the slot's current attachment as `x, y` pairs, applying the slot's
    /// deform. `None` when the slot shows nothing or a point attachment.
    pub fn slot_world_vertices(&self, slot_index: usize) -> Option<Vec<f32>> {
        let attachment = self.slot_attachment_data(slot_index)?;
        let vertices = match attachment {
            AttachmentData::Region(region) => {
                let bone = &self.bones[self.slots[slot_index].bone];
                return Some(region.compute_world_vertices(bone).to_vec());
            }
            AttachmentData::Point(_) => return None,
            other => other.vertices()?,
        };

        let world_vertices_length = vertices.vertex_count() * 2;
        let mut out = vec![0.0f32; world_vertices_length];
        compute_attachment_world_vertices(
            self,
            slot_index,
            vertices,
            0,
            world_vertices_length,
            &mut out,
            0,
            2,
        );
        Some(out)
    }
}

/// Transforms `count` floats of vertex data starting at float `start` into world space, writing
/// `x, y` pairs to `world_vertices` from `offset` every `stride` floats. Unweighted vertices use
/// the slot bone; weighted vertices sum their bone influences. The slot's deform replaces
/// unweighted positions and offsets weighted ones.
#[allow(clippy::too_many_arguments)]
pub(crate) fn compute_attachment_world_vertices(
    skeleton: &Skeleton,
    slot_index: usize,
    vertices: &MeshVertices,
    start: usize,
    count: usize,
    world_vertices: &mut Vec<f32>,
    offset: usize,
    stride: usize,
) {
    let Some(slot) = skeleton.slots.get(slot_index) else {
        return;
    };
    let Some(bone) = skeleton.bones.get(slot.bone) else {
        return;
    };

    let start_vertex = start / 2;
    let vertex_count = count / 2;
    let out_end = offset + vertex_count * stride;
    if world_vertices.len() < out_end {
        world_vertices.resize(out_end, 0.0);
    }
    let deform = slot.deform.as_slice();

    match vertices {
        MeshVertices::Unweighted(v) => {
            let n = vertex_count.min(v.len().saturating_sub(start_vertex));
            let use_deform = deform.len() >= v.len() * 2;
            for i in 0..n {
                let vi = start_vertex + i;
                let (vx, vy) = if use_deform {
                    (deform[vi * 2], deform[vi * 2 + 1])
                } else {
                    (v[vi][0], v[vi][1])
                };
                let w = offset + i * stride;
                world_vertices[w] = vx * bone.a + vy * bone.b + bone.world_x;
                world_vertices[w + 1] = vx * bone.c + vy * bone.d + bone.world_y;
            }
        }
        MeshVertices::Weighted(v) => {
            let n = vertex_count.min(v.len().saturating_sub(start_vertex));
            let skip_weights: usize = v.iter().take(start_vertex).map(Vec::len).sum();
            let mut f = skip_weights * 2;

            for i in 0..n {
                let mut wx = 0.0f32;
                let mut wy = 0.0f32;
                for weight in &v[start_vertex + i] {
                    let b = &skeleton.bones[weight.bone];
                    let dx = deform.get(f).copied().unwrap_or(0.0);
                    let dy = deform.get(f + 1).copied().unwrap_or(0.0);
                    f += 2;
                    let vx = weight.x + dx;
                    let vy = weight.y + dy;
                    wx += (b.a * vx + b.b * vy + b.world_x) * weight.weight;
                    wy += (b.c * vx + b.d * vy + b.world_y) * weight.weight;
                }
                let w = offset + i * stride;
                world_vertices[w] = wx;
                world_vertices[w + 1] = wy;
            }
        }
    }
}
