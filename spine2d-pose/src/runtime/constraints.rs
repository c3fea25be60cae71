use super::animation::wrap_degrees;
use super::attachments::compute_attachment_world_vertices;
use super::skeleton::{LocalTransform, Skeleton};
use crate::{PathAttachmentData, PositionMode, RotateMode, SpacingMode, TransformMode};
use std::f32::consts::PI;

const PI2: f32 = PI * 2.0;

#[derive(Clone, Debug, Default)]
pub(crate) struct PathConstraintScratch {
    spaces: Vec<f32>,
    lengths: Vec<f32>,
    positions: Vec<f32>,
    world: Vec<f32>,
    curves: Vec<f32>,
}

impl Skeleton {
    pub(crate) fn apply_ik_constraint(&mut self, constraint_index: usize) {
        let (target, mix, bend_direction) = {
            let ik = &self.ik_constraints[constraint_index];
            (ik.target, ik.mix, ik.bend_direction)
        };
        let target_x = self.bones[target].world_x;
        let target_y = self.bones[target].world_y;

        let bones = self.ik_constraints[constraint_index].bones.clone();
        match *bones.as_slice() {
            [bone] => self.apply_ik_one(bone, target_x, target_y, mix),
            [parent, child] => {
                self.apply_ik_two(parent, child, target_x, target_y, bend_direction, mix)
            }
            _ => {}
        }
    }

    /// Rotates a single bone so its x axis points at the target.
    pub fn apply_ik_one(&mut self, bone_index: usize, target_x: f32, target_y: f32, alpha: f32) {
        self.ensure_applied_transform(bone_index);
        let parent = self.parent_transform(bone_index);
        let (mut pb, mut pd) = (parent.b, parent.d);
        let (pa, pc) = (parent.a, parent.c);

        let bone = &self.bones[bone_index];
        let applied = bone.applied();
        let mut rotation_ik = -applied.shear_x - applied.rotation;

        let (tx, ty) = match bone.transform_mode {
            TransformMode::OnlyTranslation => (target_x - bone.world_x, target_y - bone.world_y),
            mode => {
                if mode == TransformMode::NoRotationOrReflection {
                    let s = (pa * pd - pb * pc).abs() / (pa * pa + pc * pc).max(1.0e-4);
                    pb = -pc * s;
                    pd = pa * s;
                    rotation_ik += pc.atan2(pa).to_degrees();
                }
                let x = target_x - parent.world_x;
                let y = target_y - parent.world_y;
                let det = pa * pd - pb * pc;
                if det.abs() <= 1.0e-4 {
                    (0.0, 0.0)
                } else {
                    (
                        (x * pd - y * pb) / det - applied.x,
                        (y * pa - x * pc) / det - applied.y,
                    )
                }
            }
        };

        rotation_ik += ty.atan2(tx).to_degrees();
        if applied.scale_x < 0.0 {
            rotation_ik += 180.0;
        }
        if rotation_ik > 180.0 {
            rotation_ik -= 360.0;
        } else if rotation_ik < -180.0 {
            rotation_ik += 360.0;
        }

        self.update_bone_world_transform_with(
            bone_index,
            LocalTransform {
                rotation: applied.rotation + rotation_ik * alpha,
                ..applied
            },
        );
    }

    /// Bends a parent and child bone so the child's tip reaches the target, choosing the bend
    /// side by `bend_direction`.
    pub fn apply_ik_two(
        &mut self,
        parent_index: usize,
        child_index: usize,
        target_x: f32,
        target_y: f32,
        bend_direction: i32,
        alpha: f32,
    ) {
        const EPSILON: f32 = 1.0e-4;

        if alpha == 0.0 {
            let local = self.bones[child_index].local();
            self.update_bone_world_transform_with(child_index, local);
            return;
        }
        self.ensure_applied_transform(parent_index);
        self.ensure_applied_transform(child_index);

        let parent_applied = self.bones[parent_index].applied();
        let child_applied = self.bones[child_index].applied();
        let px = parent_applied.x;
        let py = parent_applied.y;
        let mut psx = parent_applied.scale_x;
        let mut psy = parent_applied.scale_y;
        let mut csx = child_applied.scale_x;

        let (os1, mut s2) = if psx < 0.0 {
            psx = -psx;
            (180.0, -1.0)
        } else {
            (0.0, 1.0)
        };
        if psy < 0.0 {
            psy = -psy;
            s2 = -s2;
        }
        let os2 = if csx < 0.0 {
            csx = -csx;
            180.0
        } else {
            0.0
        };

        let (pa, pb, pc, pd, pwx, pwy) = {
            let p = &self.bones[parent_index];
            (p.a, p.b, p.c, p.d, p.world_x, p.world_y)
        };
        let cx = child_applied.x;
        let u = (psx - psy).abs() <= EPSILON;
        let (cy, cwx, cwy) = if !u {
            (0.0, pa * cx + pwx, pc * cx + pwy)
        } else {
            let cy = child_applied.y;
            (cy, pa * cx + pb * cy + pwx, pc * cx + pd * cy + pwy)
        };

        let pp = self.parent_transform(parent_index);
        let det = pp.a * pp.d - pp.b * pp.c;
        let id = if det.abs() <= EPSILON { 0.0 } else { 1.0 / det };
        let x = target_x - pp.world_x;
        let y = target_y - pp.world_y;
        let tx = (x * pp.d - y * pp.b) * id - px;
        let ty = (y * pp.a - x * pp.c) * id - py;
        let x = cwx - pp.world_x;
        let y = cwy - pp.world_y;
        let dx = (x * pp.d - y * pp.b) * id - px;
        let dy = (y * pp.a - x * pp.c) * id - py;

        let l1 = (dx * dx + dy * dy).sqrt();
        if l1 < EPSILON {
            self.apply_ik_one(parent_index, target_x, target_y, alpha);
            self.update_bone_world_transform_with(
                child_index,
                LocalTransform {
                    x: cx,
                    y: cy,
                    rotation: 0.0,
                    ..child_applied
                },
            );
            return;
        }

        let mut l2 = self.data.bones[child_index].length * csx;
        let bend_dir = if bend_direction >= 0 { 1.0 } else { -1.0 };
        let dd = tx * tx + ty * ty;
        let (a1, a2) = if u {
            l2 *= psx;
            let cos = ((dd - l1 * l1 - l2 * l2) / (2.0 * l1 * l2)).clamp(-1.0, 1.0);
            let a2 = cos.acos() * bend_dir;
            let a = l1 + l2 * cos;
            let b = l2 * a2.sin();
            ((ty * a - tx * b).atan2(tx * a + ty * b), a2)
        } else {
            solve_non_uniform(l1, l2, psx, psy, tx, ty, bend_dir)
        };

        let os = cy.atan2(cx) * s2;

        let rotation = parent_applied.rotation;
        let mut a1 = (a1 - os).to_degrees() + os1 - rotation;
        if a1 > 180.0 {
            a1 -= 360.0;
        } else if a1 < -180.0 {
            a1 += 360.0;
        }
        self.update_bone_world_transform_with(
            parent_index,
            LocalTransform {
                x: px,
                y: py,
                rotation: rotation + a1 * alpha,
                scale_x: parent_applied.scale_x,
                scale_y: parent_applied.scale_y,
                shear_x: 0.0,
                shear_y: 0.0,
            },
        );

        let rotation = child_applied.rotation;
        let mut a2 = ((a2 + os).to_degrees() - child_applied.shear_x) * s2 + os2 - rotation;
        if a2 > 180.0 {
            a2 -= 360.0;
        } else if a2 < -180.0 {
            a2 += 360.0;
        }
        self.update_bone_world_transform_with(
            child_index,
            LocalTransform {
                x: cx,
                y: cy,
                rotation: rotation + a2 * alpha,
                ..child_applied
            },
        );
    }

    pub(crate) fn apply_transform_constraint(&mut self, constraint_index: usize) {
        let data_index = self.transform_constraints[constraint_index].data_index();
        let data = &self.data.transform_constraints[data_index];
        match (data.local, data.relative) {
            (false, false) => self.apply_transform_absolute_world(constraint_index),
            (false, true) => self.apply_transform_relative_world(constraint_index),
            (true, false) => self.apply_transform_absolute_local(constraint_index),
            (true, true) => self.apply_transform_relative_local(constraint_index),
        }
    }

    fn apply_transform_absolute_world(&mut self, constraint_index: usize) {
        let c = self.transform_constraints[constraint_index].clone();
        let data = &self.data.transform_constraints[c.data_index()];
        let target = &self.bones[c.target];
        let (ta, tb, tc, td) = (target.a, target.b, target.c, target.d);
        let deg_rad_reflect = if ta * td - tb * tc > 0.0 {
            PI / 180.0
        } else {
            -PI / 180.0
        };
        let offset_rotation = data.offset_rotation * deg_rad_reflect;
        let offset_shear_y = data.offset_shear_y * deg_rad_reflect;
        let [tx, ty] = target.local_to_world(data.offset_x, data.offset_y);
        let (offset_scale_x, offset_scale_y) = (data.offset_scale_x, data.offset_scale_y);

        for &bone_index in &c.bones {
            let bone = &mut self.bones[bone_index];
            let mut modified = false;

            if c.rotate_mix != 0.0 {
                let (a, b, cc, d) = (bone.a, bone.b, bone.c, bone.d);
                let r = wrap_pi(tc.atan2(ta) - cc.atan2(a) + offset_rotation) * c.rotate_mix;
                let (sin, cos) = r.sin_cos();
                bone.a = cos * a - sin * cc;
                bone.b = cos * b - sin * d;
                bone.c = sin * a + cos * cc;
                bone.d = sin * b + cos * d;
                modified = true;
            }

            if c.translate_mix != 0.0 {
                bone.world_x += (tx - bone.world_x) * c.translate_mix;
                bone.world_y += (ty - bone.world_y) * c.translate_mix;
                modified = true;
            }

            if c.scale_mix > 0.0 {
                let mut s = (bone.a * bone.a + bone.c * bone.c).sqrt();
                let ts = (ta * ta + tc * tc).sqrt();
                if s > 1.0e-5 {
                    s = (s + (ts - s + offset_scale_x) * c.scale_mix) / s;
                }
                bone.a *= s;
                bone.c *= s;
                let mut s = (bone.b * bone.b + bone.d * bone.d).sqrt();
                let ts = (tb * tb + td * td).sqrt();
                if s > 1.0e-5 {
                    s = (s + (ts - s + offset_scale_y) * c.scale_mix) / s;
                }
                bone.b *= s;
                bone.d *= s;
                modified = true;
            }

            if c.shear_mix > 0.0 {
                let (b, d) = (bone.b, bone.d);
                let by = d.atan2(b);
                let r = wrap_pi(td.atan2(tb) - tc.atan2(ta) - (by - bone.c.atan2(bone.a)));
                let r = by + (r + offset_shear_y) * c.shear_mix;
                let s = (b * b + d * d).sqrt();
                bone.b = r.cos() * s;
                bone.d = r.sin() * s;
                modified = true;
            }

            if modified {
                bone.applied_valid = false;
            }
        }
    }

    fn apply_transform_relative_world(&mut self, constraint_index: usize) {
        let c = self.transform_constraints[constraint_index].clone();
        let data = &self.data.transform_constraints[c.data_index()];
        let target = &self.bones[c.target];
        let (ta, tb, tc, td) = (target.a, target.b, target.c, target.d);
        let deg_rad_reflect = if ta * td - tb * tc > 0.0 {
            PI / 180.0
        } else {
            -PI / 180.0
        };
        let offset_rotation = data.offset_rotation * deg_rad_reflect;
        let offset_shear_y = data.offset_shear_y * deg_rad_reflect;
        let [tx, ty] = target.local_to_world(data.offset_x, data.offset_y);
        let (offset_scale_x, offset_scale_y) = (data.offset_scale_x, data.offset_scale_y);

        for &bone_index in &c.bones {
            let bone = &mut self.bones[bone_index];
            let mut modified = false;

            if c.rotate_mix != 0.0 {
                let (a, b, cc, d) = (bone.a, bone.b, bone.c, bone.d);
                let r = wrap_pi(tc.atan2(ta) + offset_rotation) * c.rotate_mix;
                let (sin, cos) = r.sin_cos();
                bone.a = cos * a - sin * cc;
                bone.b = cos * b - sin * d;
                bone.c = sin * a + cos * cc;
                bone.d = sin * b + cos * d;
                modified = true;
            }

            if c.translate_mix != 0.0 {
                bone.world_x += tx * c.translate_mix;
                bone.world_y += ty * c.translate_mix;
                modified = true;
            }

            if c.scale_mix > 0.0 {
                let s = ((ta * ta + tc * tc).sqrt() - 1.0 + offset_scale_x) * c.scale_mix + 1.0;
                bone.a *= s;
                bone.c *= s;
                let s = ((tb * tb + td * td).sqrt() - 1.0 + offset_scale_y) * c.scale_mix + 1.0;
                bone.b *= s;
                bone.d *= s;
                modified = true;
            }

            if c.shear_mix > 0.0 {
                let r = wrap_pi(td.atan2(tb) - tc.atan2(ta));
                let (b, d) = (bone.b, bone.d);
                let r = d.atan2(b) + (r - PI / 2.0 + offset_shear_y) * c.shear_mix;
                let s = (b * b + d * d).sqrt();
                bone.b = r.cos() * s;
                bone.d = r.sin() * s;
                modified = true;
            }

            if modified {
                bone.applied_valid = false;
            }
        }
    }

    fn apply_transform_absolute_local(&mut self, constraint_index: usize) {
        let c = self.transform_constraints[constraint_index].clone();
        self.ensure_applied_transform(c.target);
        let target = self.bones[c.target].applied();
        let data = self.data.transform_constraints[c.data_index()].clone();

        for &bone_index in &c.bones {
            self.ensure_applied_transform(bone_index);
            let applied = self.bones[bone_index].applied();

            let mut rotation = applied.rotation;
            if c.rotate_mix != 0.0 {
                let r = wrap_degrees(target.rotation - rotation + data.offset_rotation);
                rotation += r * c.rotate_mix;
            }

            let mut x = applied.x;
            let mut y = applied.y;
            if c.translate_mix != 0.0 {
                x += (target.x - x + data.offset_x) * c.translate_mix;
                y += (target.y - y + data.offset_y) * c.translate_mix;
            }

            let mut scale_x = applied.scale_x;
            let mut scale_y = applied.scale_y;
            if c.scale_mix > 0.0 {
                if scale_x > 1.0e-5 {
                    scale_x += (target.scale_x - scale_x + data.offset_scale_x) * c.scale_mix;
                }
                if scale_y > 1.0e-5 {
                    scale_y += (target.scale_y - scale_y + data.offset_scale_y) * c.scale_mix;
                }
            }

            let mut shear_y = applied.shear_y;
            if c.shear_mix > 0.0 {
                let r = wrap_degrees(target.shear_y - shear_y + data.offset_shear_y);
                shear_y += r * c.shear_mix;
            }

            self.update_bone_world_transform_with(
                bone_index,
                LocalTransform {
                    x,
                    y,
                    rotation,
                    scale_x,
                    scale_y,
                    shear_x: applied.shear_x,
                    shear_y,
                },
            );
        }
    }

    fn apply_transform_relative_local(&mut self, constraint_index: usize) {
        let c = self.transform_constraints[constraint_index].clone();
        self.ensure_applied_transform(c.target);
        let target = self.bones[c.target].applied();
        let data = self.data.transform_constraints[c.data_index()].clone();

        for &bone_index in &c.bones {
            self.ensure_applied_transform(bone_index);
            let applied = self.bones[bone_index].applied();

            let mut rotation = applied.rotation;
            if c.rotate_mix != 0.0 {
                rotation += (target.rotation + data.offset_rotation) * c.rotate_mix;
            }

            let mut x = applied.x;
            let mut y = applied.y;
            if c.translate_mix != 0.0 {
                x += (target.x + data.offset_x) * c.translate_mix;
                y += (target.y + data.offset_y) * c.translate_mix;
            }

            let mut scale_x = applied.scale_x;
            let mut scale_y = applied.scale_y;
            if c.scale_mix > 0.0 {
                if scale_x > 1.0e-5 {
                    scale_x *= (target.scale_x - 1.0 + data.offset_scale_x) * c.scale_mix + 1.0;
                }
                if scale_y > 1.0e-5 {
                    scale_y *= (target.scale_y - 1.0 + data.offset_scale_y) * c.scale_mix + 1.0;
                }
            }

            let mut shear_y = applied.shear_y;
            if c.shear_mix > 0.0 {
                shear_y += (target.shear_y + data.offset_shear_y) * c.shear_mix;
            }

            self.update_bone_world_transform_with(
                bone_index,
                LocalTransform {
                    x,
                    y,
                    rotation,
                    scale_x,
                    scale_y,
                    shear_x: applied.shear_x,
                    shear_y,
                },
            );
        }
    }

    pub(crate) fn apply_path_constraint(&mut self, constraint_index: usize) {
        const EPSILON: f32 = 1.0e-5;

        let c = self.path_constraints[constraint_index].clone();
        let data = std::sync::Arc::clone(&self.data);
        let Some(crate::AttachmentData::Path(path)) = self.slot_attachment_data(c.target).cloned()
        else {
            return;
        };
        let translate = c.translate_mix > 0.0;
        let rotate = c.rotate_mix > 0.0;
        if !translate && !rotate {
            return;
        }

        let path_data = &data.path_constraints[c.data_index()];
        let length_spacing = path_data.spacing_mode == SpacingMode::Length;
        let tangents = path_data.rotate_mode == RotateMode::Tangent;
        let scale = path_data.rotate_mode == RotateMode::ChainScale;
        let bone_count = c.bones.len();
        let spaces_count = if tangents { bone_count } else { bone_count + 1 };

        let mut scratch = std::mem::take(&mut self.path_constraint_scratch[constraint_index]);
        scratch.spaces.clear();
        scratch.spaces.resize(spaces_count, 0.0);
        scratch.lengths.clear();
        if scale {
            scratch.lengths.resize(bone_count, 0.0);
        }

        if scale || length_spacing {
            for i in 0..spaces_count - 1 {
                let bone_index = c.bones[i];
                let setup_length = data.bones[bone_index].length;
                if setup_length < EPSILON {
                    if scale {
                        scratch.lengths[i] = 0.0;
                    }
                    scratch.spaces[i + 1] = 0.0;
                } else {
                    let bone = &self.bones[bone_index];
                    let x = setup_length * bone.a;
                    let y = setup_length * bone.c;
                    let length = (x * x + y * y).sqrt();
                    if scale {
                        scratch.lengths[i] = length;
                    }
                    let space = if length_spacing {
                        setup_length + c.spacing
                    } else {
                        c.spacing
                    };
                    scratch.spaces[i + 1] = space * length / setup_length;
                }
            }
        } else {
            for space in scratch.spaces.iter_mut().skip(1) {
                *space = c.spacing;
            }
        }

        compute_path_world_positions(
            self,
            &mut scratch,
            c.target,
            &path,
            spaces_count,
            tangents,
            path_data.position_mode == PositionMode::Percent,
            path_data.spacing_mode == SpacingMode::Percent,
            c.position,
        );

        let positions = &scratch.positions;
        let spaces = &scratch.spaces;
        let mut bone_x = positions[0];
        let mut bone_y = positions[1];
        let mut offset_rotation = path_data.offset_rotation;
        let tip = if offset_rotation == 0.0 {
            path_data.rotate_mode == RotateMode::Chain
        } else {
            let p = &self.bones[self.slots[c.target].bone];
            offset_rotation *= if p.a * p.d - p.b * p.c > 0.0 {
                PI / 180.0
            } else {
                -PI / 180.0
            };
            false
        };

        let mut p = 3;
        for (i, &bone_index) in c.bones.iter().enumerate() {
            let setup_length = data.bones[bone_index].length;
            let bone = &mut self.bones[bone_index];
            bone.world_x += (bone_x - bone.world_x) * c.translate_mix;
            bone.world_y += (bone_y - bone.world_y) * c.translate_mix;
            let x = positions[p];
            let y = positions[p + 1];
            let dx = x - bone_x;
            let dy = y - bone_y;
            if scale {
                let length = scratch.lengths[i];
                if length >= EPSILON {
                    let s = ((dx * dx + dy * dy).sqrt() / length - 1.0) * c.rotate_mix + 1.0;
                    bone.a *= s;
                    bone.c *= s;
                }
            }
            bone_x = x;
            bone_y = y;

            if rotate {
                let (a, b, cc, d) = (bone.a, bone.b, bone.c, bone.d);
                let mut r = if tangents {
                    positions[p - 1]
                } else if spaces[i + 1] < EPSILON {
                    positions[p + 2]
                } else {
                    dy.atan2(dx)
                };
                r -= cc.atan2(a);
                if tip {
                    let (sin, cos) = r.sin_cos();
                    bone_x += (setup_length * (cos * a - sin * cc) - dx) * c.rotate_mix;
                    bone_y += (setup_length * (sin * a + cos * cc) - dy) * c.rotate_mix;
                } else {
                    r += offset_rotation;
                }
                let r = wrap_pi(r) * c.rotate_mix;
                let (sin, cos) = r.sin_cos();
                bone.a = cos * a - sin * cc;
                bone.b = cos * b - sin * d;
                bone.c = sin * a + cos * cc;
                bone.d = sin * b + cos * d;
            }
            bone.applied_valid = false;
            p += 3;
        }

        self.path_constraint_scratch[constraint_index] = scratch;
    }
}

/// Two-bone IK for a parent with non-uniform scale: intersects the target circle with the
/// child's ellipse, falling back to the closest or farthest reachable point.
fn solve_non_uniform(
    l1: f32,
    l2: f32,
    psx: f32,
    psy: f32,
    tx: f32,
    ty: f32,
    bend_dir: f32,
) -> (f32, f32) {
    let a = psx * l2;
    let b = psy * l2;
    let aa = a * a;
    let bb = b * b;
    let dd = tx * tx + ty * ty;
    let ta = ty.atan2(tx);
    let c = bb * l1 * l1 + aa * dd - aa * bb;
    let c1 = -2.0 * bb * l1;
    let c2 = bb - aa;
    let d = c1 * c1 - 4.0 * c2 * c;
    if d >= 0.0 {
        let mut q = d.sqrt();
        if c1 < 0.0 {
            q = -q;
        }
        q = -(c1 + q) * 0.5;
        let r0 = q / c2;
        let r1 = c / q;
        let r = if r0.abs() < r1.abs() { r0 } else { r1 };
        if r * r <= dd {
            let y = (dd - r * r).sqrt() * bend_dir;
            return (ta - y.atan2(r), (y / psy).atan2((r - l1) / psx));
        }
    }

    let mut min_angle = PI;
    let mut min_x = l1 - a;
    let mut min_dist = min_x * min_x;
    let mut min_y = 0.0;
    let mut max_angle = 0.0;
    let mut max_x = l1 + a;
    let mut max_dist = max_x * max_x;
    let mut max_y = 0.0;
    let c = -a * l1 / (aa - bb);
    if (-1.0..=1.0).contains(&c) {
        let c = c.acos();
        let x = a * c.cos() + l1;
        let y = b * c.sin();
        let d = x * x + y * y;
        if d < min_dist {
            min_angle = c;
            min_dist = d;
            min_x = x;
            min_y = y;
        }
        if d > max_dist {
            max_angle = c;
            max_dist = d;
            max_x = x;
            max_y = y;
        }
    }
    if dd <= (min_dist + max_dist) * 0.5 {
        (ta - (min_y * bend_dir).atan2(min_x), min_angle * bend_dir)
    } else {
        (ta - (max_y * bend_dir).atan2(max_x), max_angle * bend_dir)
    }
}

fn wrap_pi(mut radians: f32) -> f32 {
    if radians > PI {
        radians -= PI2;
    } else if radians < -PI {
        radians += PI2;
    }
    radians
}

/// Fills `scratch.positions` with `x, y, rotation` triples for each space along the path,
/// preceded by the start position.
#[allow(clippy::too_many_arguments)]
fn compute_path_world_positions(
    skeleton: &Skeleton,
    scratch: &mut PathConstraintScratch,
    slot_index: usize,
    path: &PathAttachmentData,
    spaces_count: usize,
    tangents: bool,
    percent_position: bool,
    percent_spacing: bool,
    mut position: f32,
) {
    const EPSILON: f32 = 1.0e-5;
    const NONE: i32 = -1;
    const BEFORE: i32 = -2;
    const AFTER: i32 = -3;

    let PathConstraintScratch {
        spaces,
        positions,
        world,
        curves,
        ..
    } = scratch;
    positions.clear();
    positions.resize(spaces_count * 3 + 2, 0.0);
    let output = positions.as_mut_slice();

    let closed = path.closed;
    let mut vertices_length = path.vertices.vertex_count() * 2;
    if vertices_length < 6 {
        return;
    }
    let mut curve_count = vertices_length / 6;
    let mut prev_curve = NONE;

    if !path.constant_speed {
        let lengths = path.lengths.as_slice();
        let Some(curve_count) = curve_count.checked_sub(if closed { 1 } else { 2 }) else {
            return;
        };
        let Some(&path_length) = lengths.get(curve_count) else {
            log::warn!("path attachment has fewer curve lengths than curves");
            return;
        };
        if percent_position {
            position *= path_length;
        }
        if percent_spacing {
            for space in spaces.iter_mut() {
                *space *= path_length;
            }
        }

        world.clear();
        world.resize(8, 0.0);
        let mut curve = 0usize;
        for i in 0..spaces_count {
            let o = i * 3;
            let space = spaces[i];
            position += space;
            let mut p = position;

            if closed {
                p = p.rem_euclid(path_length);
                curve = 0;
            } else if p < 0.0 {
                if prev_curve != BEFORE {
                    prev_curve = BEFORE;
                    compute_attachment_world_vertices(
                        skeleton,
                        slot_index,
                        &path.vertices,
                        2,
                        4,
                        world,
                        0,
                        2,
                    );
                }
                add_before_position(p, world, 0, output, o);
                continue;
            } else if p > path_length {
                if prev_curve != AFTER {
                    prev_curve = AFTER;
                    compute_attachment_world_vertices(
                        skeleton,
                        slot_index,
                        &path.vertices,
                        vertices_length - 6,
                        4,
                        world,
                        0,
                        2,
                    );
                }
                add_after_position(p - path_length, world, 0, output, o);
                continue;
            }

            while curve < lengths.len() {
                let length = lengths[curve];
                if p > length {
                    curve += 1;
                    continue;
                }
                if curve == 0 {
                    p /= length.max(EPSILON);
                } else {
                    let prev = lengths[curve - 1];
                    p = (p - prev) / (length - prev).max(EPSILON);
                }
                break;
            }
            if curve > curve_count {
                curve = curve_count;
                p = 1.0;
            }

            if curve as i32 != prev_curve {
                prev_curve = curve as i32;
                if closed && curve == curve_count {
                    compute_attachment_world_vertices(
                        skeleton,
                        slot_index,
                        &path.vertices,
                        vertices_length - 4,
                        4,
                        world,
                        0,
                        2,
                    );
                    compute_attachment_world_vertices(
                        skeleton,
                        slot_index,
                        &path.vertices,
                        0,
                        4,
                        world,
                        4,
                        2,
                    );
                } else {
                    compute_attachment_world_vertices(
                        skeleton,
                        slot_index,
                        &path.vertices,
                        curve * 6 + 2,
                        8,
                        world,
                        0,
                        2,
                    );
                }
            }

            add_curve_position(
                p,
                [
                    world[0], world[1], world[2], world[3], world[4], world[5], world[6], world[7],
                ],
                output,
                o,
                tangents || (i > 0 && space < EPSILON),
            );
        }
        return;
    }

    world.clear();
    if closed {
        vertices_length += 2;
        world.resize(vertices_length, 0.0);
        compute_attachment_world_vertices(
            skeleton,
            slot_index,
            &path.vertices,
            2,
            vertices_length - 4,
            world,
            0,
            2,
        );
        compute_attachment_world_vertices(
            skeleton,
            slot_index,
            &path.vertices,
            0,
            2,
            world,
            vertices_length - 4,
            2,
        );
        world[vertices_length - 2] = world[0];
        world[vertices_length - 1] = world[1];
    } else {
        curve_count -= 1;
        if curve_count == 0 {
            return;
        }
        vertices_length -= 4;
        world.resize(vertices_length, 0.0);
        compute_attachment_world_vertices(
            skeleton,
            slot_index,
            &path.vertices,
            2,
            vertices_length,
            world,
            0,
            2,
        );
    }
    let world = world.as_slice();

    curves.clear();
    curves.resize(curve_count, 0.0);
    let mut path_length = 0.0f32;
    let mut x1 = world[0];
    let mut y1 = world[1];
    let mut w = 2;
    for curve in curves.iter_mut() {
        let cx1 = world[w];
        let cy1 = world[w + 1];
        let cx2 = world[w + 2];
        let cy2 = world[w + 3];
        let x2 = world[w + 4];
        let y2 = world[w + 5];
        let tmpx = (x1 - cx1 * 2.0 + cx2) * 0.1875;
        let tmpy = (y1 - cy1 * 2.0 + cy2) * 0.1875;
        let dddfx = ((cx1 - cx2) * 3.0 - x1 + x2) * 0.09375;
        let dddfy = ((cy1 - cy2) * 3.0 - y1 + y2) * 0.09375;
        let mut ddfx = tmpx * 2.0 + dddfx;
        let mut ddfy = tmpy * 2.0 + dddfy;
        let mut dfx = (cx1 - x1) * 0.75 + tmpx + dddfx * 0.16666667;
        let mut dfy = (cy1 - y1) * 0.75 + tmpy + dddfy * 0.16666667;
        path_length += (dfx * dfx + dfy * dfy).sqrt();
        dfx += ddfx;
        dfy += ddfy;
        ddfx += dddfx;
        ddfy += dddfy;
        path_length += (dfx * dfx + dfy * dfy).sqrt();
        dfx += ddfx;
        dfy += ddfy;
        path_length += (dfx * dfx + dfy * dfy).sqrt();
        dfx += ddfx + dddfx;
        dfy += ddfy + dddfy;
        path_length += (dfx * dfx + dfy * dfy).sqrt();
        *curve = path_length;
        x1 = x2;
        y1 = y2;
        w += 6;
    }
    if percent_position {
        position *= path_length;
    }
    if percent_spacing {
        for space in spaces.iter_mut() {
            *space *= path_length;
        }
    }

    let mut segments = [0.0f32; 10];
    let mut curve_length = 0.0f32;
    let mut curve = 0usize;
    let mut segment = 0usize;
    let mut points = [0.0f32; 8];
    for i in 0..spaces_count {
        let o = i * 3;
        let space = spaces[i];
        position += space;
        let mut p = position;

        if closed {
            p = p.rem_euclid(path_length);
            curve = 0;
        } else if p < 0.0 {
            add_before_position(p, world, 0, output, o);
            continue;
        } else if p > path_length {
            add_after_position(p - path_length, world, vertices_length - 4, output, o);
            continue;
        }

        while curve < curves.len() {
            let length = curves[curve];
            if p > length {
                curve += 1;
                continue;
            }
            if curve == 0 {
                p /= length.max(EPSILON);
            } else {
                let prev = curves[curve - 1];
                p = (p - prev) / (length - prev).max(EPSILON);
            }
            break;
        }
        if curve >= curves.len() {
            curve = curves.len() - 1;
            p = 1.0;
        }

        if curve as i32 != prev_curve {
            prev_curve = curve as i32;
            let ii = curve * 6;
            points.copy_from_slice(&world[ii..ii + 8]);
            let [x1, y1, cx1, cy1, cx2, cy2, x2, y2] = points;
            let tmpx = (x1 - cx1 * 2.0 + cx2) * 0.03;
            let tmpy = (y1 - cy1 * 2.0 + cy2) * 0.03;
            let dddfx = ((cx1 - cx2) * 3.0 - x1 + x2) * 0.006;
            let dddfy = ((cy1 - cy2) * 3.0 - y1 + y2) * 0.006;
            let mut ddfx = tmpx * 2.0 + dddfx;
            let mut ddfy = tmpy * 2.0 + dddfy;
            let mut dfx = (cx1 - x1) * 0.3 + tmpx + dddfx * 0.16666667;
            let mut dfy = (cy1 - y1) * 0.3 + tmpy + dddfy * 0.16666667;
            curve_length = (dfx * dfx + dfy * dfy).sqrt();
            segments[0] = curve_length;
            for seg in segments.iter_mut().take(8).skip(1) {
                dfx += ddfx;
                dfy += ddfy;
                ddfx += dddfx;
                ddfy += dddfy;
                curve_length += (dfx * dfx + dfy * dfy).sqrt();
                *seg = curve_length;
            }
            dfx += ddfx;
            dfy += ddfy;
            curve_length += (dfx * dfx + dfy * dfy).sqrt();
            segments[8] = curve_length;
            dfx += ddfx + dddfx;
            dfy += ddfy + dddfy;
            curve_length += (dfx * dfx + dfy * dfy).sqrt();
            segments[9] = curve_length;
            segment = 0;
        }

        p *= curve_length;
        loop {
            let length = segments[segment];
            if p > length && segment < segments.len() - 1 {
                segment += 1;
                continue;
            }
            if segment == 0 {
                p /= length.max(EPSILON);
            } else {
                let prev = segments[segment - 1];
                p = segment as f32 + (p - prev) / (length - prev).max(EPSILON);
            }
            break;
        }

        add_curve_position(
            p * 0.1,
            points,
            output,
            o,
            tangents || (i > 0 && space < EPSILON),
        );
    }
}

fn add_before_position(p: f32, temp: &[f32], i: usize, output: &mut [f32], o: usize) {
    let x1 = temp[i];
    let y1 = temp[i + 1];
    let dx = temp[i + 2] - x1;
    let dy = temp[i + 3] - y1;
    let r = dy.atan2(dx);
    output[o] = x1 + p * r.cos();
    output[o + 1] = y1 + p * r.sin();
    output[o + 2] = r;
}

fn add_after_position(p: f32, temp: &[f32], i: usize, output: &mut [f32], o: usize) {
    let x1 = temp[i + 2];
    let y1 = temp[i + 3];
    let dx = x1 - temp[i];
    let dy = y1 - temp[i + 1];
    let r = dy.atan2(dx);
    output[o] = x1 + p * r.cos();
    output[o + 1] = y1 + p * r.sin();
    output[o + 2] = r;
}

/// Evaluates the cubic Bezier `[x1, y1, cx1, cy1, cx2, cy2, x2, y2]` at `p`, writing the
/// position and, when `tangents` is set, the tangent angle.
fn add_curve_position(p: f32, points: [f32; 8], output: &mut [f32], o: usize, tangents: bool) {
    const EPSILON: f32 = 1.0e-5;
    let [x1, y1, cx1, cy1, cx2, cy2, x2, y2] = points;
    if p < EPSILON || p.is_nan() {
        output[o] = x1;
        output[o + 1] = y1;
        output[o + 2] = (cy1 - y1).atan2(cx1 - x1);
        return;
    }
    let tt = p * p;
    let ttt = tt * p;
    let u = 1.0 - p;
    let uu = u * u;
    let uuu = uu * u;
    let ut = u * p;
    let ut3 = ut * 3.0;
    let uut3 = u * ut3;
    let utt3 = ut3 * p;
    let x = x1 * uuu + cx1 * uut3 + cx2 * utt3 + x2 * ttt;
    let y = y1 * uuu + cy1 * uut3 + cy2 * utt3 + y2 * ttt;
    output[o] = x;
    output[o + 1] = y;
    if tangents {
        if p < 0.001 {
            output[o + 2] = (cy1 - y1).atan2(cx1 - x1);
        } else {
            output[o + 2] = (y - (y1 * uu + cy1 * ut * 2.0 + cy2 * tt))
                .atan2(x - (x1 * uu + cx1 * ut * 2.0 + cx2 * tt));
        }
    }
}
