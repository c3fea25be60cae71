use crate::{
    AttachmentData, DEFAULT_SKIN_NAME, Error, MeshVertices, SkeletonData, TransformMode,
};
use std::sync::Arc;

use super::constraints::PathConstraintScratch;

/// Local transform values of a bone: position, rotation and shear in degrees, scale.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LocalTransform {
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub shear_x: f32,
    pub shear_y: f32,
}

#[derive(Clone, Debug)]
pub struct Bone {
    data_index: usize,
    parent: Option<usize>,

    pub transform_mode: TransformMode,

    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub shear_x: f32,
    pub shear_y: f32,

    pub ax: f32,
    pub ay: f32,
    pub arotation: f32,
    pub ascale_x: f32,
    pub ascale_y: f32,
    pub ashear_x: f32,
    pub ashear_y: f32,

    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub world_x: f32,
    pub world_y: f32,

    pub(crate) applied_valid: bool,
    sorted: bool,
}

impl Bone {
    pub fn data_index(&self) -> usize {
        self.data_index
    }

    pub fn parent_index(&self) -> Option<usize> {
        self.parent
    }

    /// Whether the applied transform still matches the world transform.
    pub fn is_applied_valid(&self) -> bool {
        self.applied_valid
    }

    pub fn local(&self) -> LocalTransform {
        LocalTransform {
            x: self.x,
            y: self.y,
            rotation: self.rotation,
            scale_x: self.scale_x,
            scale_y: self.scale_y,
            shear_x: self.shear_x,
            shear_y: self.shear_y,
        }
    }

    pub fn applied(&self) -> LocalTransform {
        LocalTransform {
            x: self.ax,
            y: self.ay,
            rotation: self.arotation,
            scale_x: self.ascale_x,
            scale_y: self.ascale_y,
            shear_x: self.ashear_x,
            shear_y: self.ashear_y,
        }
    }

    fn set_applied(&mut self, t: LocalTransform) {
        self.ax = t.x;
        self.ay = t.y;
        self.arotation = t.rotation;
        self.ascale_x = t.scale_x;
        self.ascale_y = t.scale_y;
        self.ashear_x = t.shear_x;
        self.ashear_y = t.shear_y;
        self.applied_valid = true;
    }

    fn reset_applied_to_local(&mut self) {
        self.set_applied(self.local());
    }

    pub fn world_rotation_x(&self) -> f32 {
        self.c.atan2(self.a).to_degrees()
    }

    pub fn world_rotation_y(&self) -> f32 {
        self.d.atan2(self.b).to_degrees()
    }

    pub fn world_scale_x(&self) -> f32 {
        (self.a * self.a + self.c * self.c).sqrt()
    }

    pub fn world_scale_y(&self) -> f32 {
        (self.b * self.b + self.d * self.d).sqrt()
    }

    pub fn world_to_local(&self, world_x: f32, world_y: f32) -> [f32; 2] {
        let det = self.a * self.d - self.b * self.c;
        let inv_det = if det == 0.0 { 0.0 } else { 1.0 / det };
        let x = world_x - self.world_x;
        let y = world_y - self.world_y;
        [
            x * self.d * inv_det - y * self.b * inv_det,
            y * self.a * inv_det - x * self.c * inv_det,
        ]
    }

    pub fn local_to_world(&self, local_x: f32, local_y: f32) -> [f32; 2] {
        [
            local_x * self.a + local_y * self.b + self.world_x,
            local_x * self.c + local_y * self.d + self.world_y,
        ]
    }

    pub fn world_to_local_rotation(&self, world_rotation: f32) -> f32 {
        let (sin, cos) = world_rotation.to_radians().sin_cos();
        (self.a * sin - self.c * cos)
            .atan2(self.d * cos - self.b * sin)
            .to_degrees()
            + self.rotation
            - self.shear_x
    }

    pub fn local_to_world_rotation(&self, local_rotation: f32) -> f32 {
        let (sin, cos) = (local_rotation - self.rotation + self.shear_x)
            .to_radians()
            .sin_cos();
        (cos * self.c + sin * self.d)
            .atan2(cos * self.a + sin * self.b)
            .to_degrees()
    }

    /// Rotates the world transform by `degrees`. The applied transform becomes stale.
    pub fn rotate_world(&mut self, degrees: f32) {
        let (sin, cos) = degrees.to_radians().sin_cos();
        let (a, b, c, d) = (self.a, self.b, self.c, self.d);
        self.a = cos * a - sin * c;
        self.b = cos * b - sin * d;
        self.c = sin * a + cos * c;
        self.d = sin * b + cos * d;
        self.applied_valid = false;
    }

    /// The world transform as a `glam` affine: columns `(a, c)`, `(b, d)` and the translation.
    #[cfg(feature = "glam")]
    pub fn world_affine(&self) -> glam::Affine2 {
        glam::Affine2::from_cols_array(&[
            self.a,
            self.c,
            self.b,
            self.d,
            self.world_x,
            self.world_y,
        ])
    }
}

#[derive(Clone, Debug)]
pub struct Slot {
    data_index: usize,
    pub bone: usize,
    pub attachment: Option<String>,
    pub(crate) attachment_skin: Option<String>,
    attachment_time: f32,
    /// Deformed vertex values for the current vertex attachment; empty when undeformed.
    pub deform: Vec<f32>,
    pub color: [f32; 4],
    pub dark_color: Option<[f32; 3]>,
}

impl Slot {
    pub fn data_index(&self) -> usize {
        self.data_index
    }
}

#[derive(Clone, Debug)]
pub struct IkConstraint {
    data_index: usize,
    pub bones: Vec<usize>,
    pub target: usize,
    pub mix: f32,
    pub bend_direction: i32,
}

impl IkConstraint {
    pub fn data_index(&self) -> usize {
        self.data_index
    }
}

#[derive(Clone, Debug)]
pub struct TransformConstraint {
    data_index: usize,
    pub bones: Vec<usize>,
    pub target: usize,
    pub rotate_mix: f32,
    pub translate_mix: f32,
    pub scale_mix: f32,
    pub shear_mix: f32,
}

impl TransformConstraint {
    pub fn data_index(&self) -> usize {
        self.data_index
    }
}

#[derive(Clone, Debug)]
pub struct PathConstraint {
    data_index: usize,
    pub bones: Vec<usize>,
    pub target: usize, // slot index
    pub position: f32,
    pub spacing: f32,
    pub rotate_mix: f32,
    pub translate_mix: f32,
}

impl PathConstraint {
    pub fn data_index(&self) -> usize {
        self.data_index
    }
}

/// One step of [`Skeleton::update_world_transform`], in evaluation order.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum UpdateCacheItem {
    Bone(usize),
    Ik(usize),
    Transform(usize),
    Path(usize),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
enum ConstraintKind {
    Ik,
    Transform,
    Path,
}

#[derive(Copy, Clone, Debug)]
struct OrderedConstraint {
    order: i32,
    kind: ConstraintKind,
    index: usize,
}

/// World matrix of a bone's parent. Root bones use the skeleton itself: its position and flips.
#[derive(Copy, Clone, Debug)]
pub(crate) struct ParentTransform {
    pub(crate) a: f32,
    pub(crate) b: f32,
    pub(crate) c: f32,
    pub(crate) d: f32,
    pub(crate) world_x: f32,
    pub(crate) world_y: f32,
}

impl ParentTransform {
    fn of(bone: &Bone) -> Self {
        Self {
            a: bone.a,
            b: bone.b,
            c: bone.c,
            d: bone.d,
            world_x: bone.world_x,
            world_y: bone.world_y,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Skeleton {
    pub data: Arc<SkeletonData>,
    pub bones: Vec<Bone>,
    bone_children: Vec<Vec<usize>>,
    pub slots: Vec<Slot>,
    /// Slot indices in the order they are drawn.
    pub draw_order: Vec<usize>,
    pub skin: Option<String>,
    pub ik_constraints: Vec<IkConstraint>,
    pub transform_constraints: Vec<TransformConstraint>,
    pub path_constraints: Vec<PathConstraint>,
    pub color: [f32; 4],
    pub x: f32,
    pub y: f32,
    pub flip_x: bool,
    pub flip_y: bool,
    time: f32,
    update_cache: Vec<UpdateCacheItem>,
    update_cache_reset: Vec<usize>,
    pub(crate) path_constraint_scratch: Vec<PathConstraintScratch>,
}

impl Skeleton {
    pub fn new(data: Arc<SkeletonData>) -> Self {
        let bones = data
            .bones
            .iter()
            .enumerate()
            .map(|(data_index, bone)| Bone {
                data_index,
                parent: bone.parent,
                transform_mode: bone.transform_mode,
                x: bone.x,
                y: bone.y,
                rotation: bone.rotation,
                scale_x: bone.scale_x,
                scale_y: bone.scale_y,
                shear_x: bone.shear_x,
                shear_y: bone.shear_y,
                ax: bone.x,
                ay: bone.y,
                arotation: bone.rotation,
                ascale_x: bone.scale_x,
                ascale_y: bone.scale_y,
                ashear_x: bone.shear_x,
                ashear_y: bone.shear_y,
                a: 1.0,
                b: 0.0,
                c: 0.0,
                d: 1.0,
                world_x: 0.0,
                world_y: 0.0,
                applied_valid: true,
                sorted: false,
            })
            .collect::<Vec<_>>();

        let bone_children = build_bone_children_indices(&bones);

        let slots = data
            .slots
            .iter()
            .enumerate()
            .map(|(data_index, slot)| Slot {
                data_index,
                bone: slot.bone,
                attachment: None,
                attachment_skin: None,
                attachment_time: 0.0,
                deform: Vec::new(),
                color: slot.color,
                dark_color: slot.dark_color,
            })
            .collect::<Vec<_>>();

        let ik_constraints = data
            .ik_constraints
            .iter()
            .enumerate()
            .map(|(data_index, c)| IkConstraint {
                data_index,
                bones: c.bones.clone(),
                target: c.target,
                mix: c.mix,
                bend_direction: c.bend_direction,
            })
            .collect();

        let transform_constraints = data
            .transform_constraints
            .iter()
            .enumerate()
            .map(|(data_index, c)| TransformConstraint {
                data_index,
                bones: c.bones.clone(),
                target: c.target,
                rotate_mix: c.rotate_mix,
                translate_mix: c.translate_mix,
                scale_mix: c.scale_mix,
                shear_mix: c.shear_mix,
            })
            .collect();

        let path_constraints = data
            .path_constraints
            .iter()
            .enumerate()
            .map(|(data_index, c)| PathConstraint {
                data_index,
                bones: c.bones.clone(),
                target: c.target,
                position: c.position,
                spacing: c.spacing,
                rotate_mix: c.rotate_mix,
                translate_mix: c.translate_mix,
            })
            .collect::<Vec<_>>();
        let path_constraint_scratch = vec![PathConstraintScratch::default(); path_constraints.len()];

        let mut skeleton = Self {
            draw_order: (0..slots.len()).collect(),
            data,
            bones,
            bone_children,
            slots,
            skin: None,
            ik_constraints,
            transform_constraints,
            path_constraints,
            color: [1.0, 1.0, 1.0, 1.0],
            x: 0.0,
            y: 0.0,
            flip_x: false,
            flip_y: false,
            time: 0.0,
            update_cache: Vec::new(),
            update_cache_reset: Vec::new(),
            path_constraint_scratch,
        };
        skeleton.set_slots_to_setup_pose();
        skeleton.update_cache();
        skeleton
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn set_time(&mut self, time: f32) {
        self.time = time;
    }

    /// Advances the skeleton clock used for slot attachment times.
    pub fn update(&mut self, delta: f32) {
        self.time += delta;
    }

    pub fn children(&self, bone_index: usize) -> &[usize] {
        self.bone_children
            .get(bone_index)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn update_cache_items(&self) -> &[UpdateCacheItem] {
        &self.update_cache
    }

    /// Bones whose applied transform is reset to their local transform before each update,
    /// because a constraint sets their world transform directly.
    pub fn update_cache_reset(&self) -> &[usize] {
        &self.update_cache_reset
    }

    /// Rebuilds the order in which bones and constraints are updated. Must be called after
    /// changing the skin or constraint bones.
    pub fn update_cache(&mut self) {
        self.update_cache.clear();
        self.update_cache_reset.clear();
        for bone in &mut self.bones {
            bone.sorted = false;
        }

        let mut constraints = Vec::with_capacity(
            self.ik_constraints.len()
                + self.transform_constraints.len()
                + self.path_constraints.len(),
        );
        for (index, c) in self.ik_constraints.iter().enumerate() {
            constraints.push(OrderedConstraint {
                order: self.data.ik_constraints[c.data_index].order,
                kind: ConstraintKind::Ik,
                index,
            });
        }
        for (index, c) in self.transform_constraints.iter().enumerate() {
            constraints.push(OrderedConstraint {
                order: self.data.transform_constraints[c.data_index].order,
                kind: ConstraintKind::Transform,
                index,
            });
        }
        for (index, c) in self.path_constraints.iter().enumerate() {
            constraints.push(OrderedConstraint {
                order: self.data.path_constraints[c.data_index].order,
                kind: ConstraintKind::Path,
                index,
            });
        }
        constraints.sort_by_key(|c| (c.order, c.kind, c.index));

        for c in constraints {
            match c.kind {
                ConstraintKind::Ik => self.sort_ik_constraint(c.index),
                ConstraintKind::Transform => self.sort_transform_constraint(c.index),
                ConstraintKind::Path => self.sort_path_constraint(c.index),
            }
        }

        for bone_index in 0..self.bones.len() {
            self.sort_bone(bone_index);
        }

        log::debug!(
            "rebuilt update cache: {} items, {} reset bones",
            self.update_cache.len(),
            self.update_cache_reset.len()
        );
    }

    fn sort_bone(&mut self, bone_index: usize) {
        if self.bones[bone_index].sorted {
            return;
        }
        if let Some(parent) = self.bones[bone_index].parent {
            self.sort_bone(parent);
        }
        self.bones[bone_index].sorted = true;
        self.update_cache.push(UpdateCacheItem::Bone(bone_index));
    }

    fn sort_reset_children(&mut self, bone_index: usize) {
        sort_reset(
            &mut self.bones,
            &self.bone_children,
            &self.bone_children[bone_index],
        );
    }

    fn cache_contains_bone(&self, bone_index: usize) -> bool {
        self.update_cache
            .iter()
            .any(|item| *item == UpdateCacheItem::Bone(bone_index))
    }

    fn sort_ik_constraint(&mut self, constraint_index: usize) {
        let (target, bones) = {
            let c = &self.ik_constraints[constraint_index];
            (c.target, c.bones.clone())
        };
        let (Some(&parent), Some(&last)) = (bones.first(), bones.last()) else {
            return;
        };
        self.sort_bone(target);
        self.sort_bone(parent);
        if bones.len() > 1 && !self.cache_contains_bone(last) {
            self.update_cache_reset.push(last);
        }
        self.update_cache.push(UpdateCacheItem::Ik(constraint_index));
        self.sort_reset_children(parent);
        self.bones[last].sorted = true;
    }

    fn sort_transform_constraint(&mut self, constraint_index: usize) {
        let (target, bones) = {
            let c = &self.transform_constraints[constraint_index];
            (c.target, c.bones.clone())
        };
        let data_index = self.transform_constraints[constraint_index].data_index;
        let local = self.data.transform_constraints[data_index].local;
        self.sort_bone(target);
        if local {
            for &child in &bones {
                if let Some(parent) = self.bones[child].parent {
                    self.sort_bone(parent);
                }
                if !self.cache_contains_bone(child) {
                    self.update_cache_reset.push(child);
                }
            }
        } else {
            for &bone in &bones {
                self.sort_bone(bone);
            }
        }
        self.update_cache
            .push(UpdateCacheItem::Transform(constraint_index));
        for &bone in &bones {
            self.sort_reset_children(bone);
        }
        for &bone in &bones {
            self.bones[bone].sorted = true;
        }
    }

    fn sort_path_constraint(&mut self, constraint_index: usize) {
        let (slot_index, bones) = {
            let c = &self.path_constraints[constraint_index];
            (c.target, c.bones.clone())
        };
        let slot_bone = self.slots[slot_index].bone;
        let data = Arc::clone(&self.data);

        let active_skin = self.skin.clone();
        let mut skin_names: Vec<&str> = Vec::with_capacity(data.skins.len());
        if let Some(skin) = active_skin.as_deref() {
            skin_names.push(skin);
        }
        if active_skin.as_deref() != Some(DEFAULT_SKIN_NAME)
            && data.skins.contains_key(DEFAULT_SKIN_NAME)
        {
            skin_names.push(DEFAULT_SKIN_NAME);
        }
        let mut others = data
            .skins
            .keys()
            .map(String::as_str)
            .filter(|name| !skin_names.contains(name))
            .collect::<Vec<_>>();
        others.sort_unstable();
        skin_names.extend(others);

        for name in skin_names {
            let Some(skin) = data.skin(name) else {
                continue;
            };
            let Some(attachments) = skin.attachments.get(slot_index) else {
                continue;
            };
            let mut names = attachments.keys().collect::<Vec<_>>();
            names.sort_unstable();
            for attachment_name in names {
                self.sort_path_attachment(&attachments[attachment_name], slot_bone);
            }
        }
        if let Some(attachment) = self.slot_attachment_data(slot_index).cloned() {
            self.sort_path_attachment(&attachment, slot_bone);
        }

        for &bone in &bones {
            self.sort_bone(bone);
        }
        self.update_cache.push(UpdateCacheItem::Path(constraint_index));
        for &bone in &bones {
            self.sort_reset_children(bone);
        }
        for &bone in &bones {
            self.bones[bone].sorted = true;
        }
    }

    fn sort_path_attachment(&mut self, attachment: &AttachmentData, slot_bone: usize) {
        let AttachmentData::Path(path) = attachment else {
            return;
        };
        match &path.vertices {
            MeshVertices::Unweighted(_) => self.sort_bone(slot_bone),
            MeshVertices::Weighted(vertices) => {
                for weight in vertices.iter().flatten() {
                    self.sort_bone(weight.bone);
                }
            }
        }
    }

    /// Computes world transforms for every bone, applying constraints in update cache order.
    pub fn update_world_transform(&mut self) {
        for i in 0..self.update_cache_reset.len() {
            let bone_index = self.update_cache_reset[i];
            self.bones[bone_index].reset_applied_to_local();
        }

        for i in 0..self.update_cache.len() {
            match self.update_cache[i] {
                UpdateCacheItem::Bone(bone_index) => {
                    let local = self.bones[bone_index].local();
                    self.update_bone_world_transform_with(bone_index, local);
                }
                UpdateCacheItem::Ik(c) => self.apply_ik_constraint(c),
                UpdateCacheItem::Transform(c) => self.apply_transform_constraint(c),
                UpdateCacheItem::Path(c) => self.apply_path_constraint(c),
            }
        }
    }

    /// World transform of the bone's parent, or the skeleton transform for root bones.
    pub(crate) fn parent_transform(&self, bone_index: usize) -> ParentTransform {
        match self.bones[bone_index].parent {
            Some(parent) => ParentTransform::of(&self.bones[parent]),
            None => ParentTransform {
                a: if self.flip_x { -1.0 } else { 1.0 },
                b: 0.0,
                c: 0.0,
                d: if self.flip_y { -1.0 } else { 1.0 },
                world_x: self.x,
                world_y: self.y,
            },
        }
    }

    /// Sets the applied transform of a bone and computes its world transform from it.
    pub fn update_bone_world_transform_with(&mut self, bone_index: usize, t: LocalTransform) {
        let parent = self.bones[bone_index]
            .parent
            .map(|p| ParentTransform::of(&self.bones[p]));
        let (skeleton_x, skeleton_y) = (self.x, self.y);
        let (flip_x, flip_y) = (self.flip_x, self.flip_y);

        let bone = &mut self.bones[bone_index];
        bone.set_applied(t);
        match parent {
            None => update_world_transform_root(bone, t, skeleton_x, skeleton_y, flip_x, flip_y),
            Some(parent) => update_world_transform_child(bone, t, &parent, flip_x, flip_y),
        }
    }

    /// Recomputes the applied transform of a bone from its world transform, e.g. after a
    /// constraint modified the world transform directly.
    pub fn update_applied_transform(&mut self, bone_index: usize) {
        let parent = self.parent_transform(bone_index);
        let bone = &mut self.bones[bone_index];
        bone.applied_valid = true;

        let (pa, pb, pc, pd) = (parent.a, parent.b, parent.c, parent.d);
        let det = pa * pd - pb * pc;
        let pid = if det == 0.0 { 0.0 } else { 1.0 / det };
        let dx = bone.world_x - parent.world_x;
        let dy = bone.world_y - parent.world_y;
        bone.ax = dx * pd * pid - dy * pb * pid;
        bone.ay = dy * pa * pid - dx * pc * pid;

        let ia = pid * pd;
        let id = pid * pa;
        let ib = pid * pb;
        let ic = pid * pc;
        let ra = ia * bone.a - ib * bone.c;
        let rb = ia * bone.b - ib * bone.d;
        let rc = id * bone.c - ic * bone.a;
        let rd = id * bone.d - ic * bone.b;

        bone.ashear_x = 0.0;
        bone.ascale_x = (ra * ra + rc * rc).sqrt();
        if bone.ascale_x > 1.0e-4 {
            let det = ra * rd - rb * rc;
            bone.ascale_y = det / bone.ascale_x;
            bone.ashear_y = (ra * rb + rc * rd).atan2(det).to_degrees();
            bone.arotation = rc.atan2(ra).to_degrees();
        } else {
            bone.ascale_x = 0.0;
            bone.ascale_y = (rb * rb + rd * rd).sqrt();
            bone.ashear_y = 0.0;
            bone.arotation = 90.0 - rd.atan2(rb).to_degrees();
        }
    }

    pub(crate) fn ensure_applied_transform(&mut self, bone_index: usize) {
        if !self.bones[bone_index].applied_valid {
            self.update_applied_transform(bone_index);
        }
    }

    pub fn set_to_setup_pose(&mut self) {
        self.set_bones_to_setup_pose();
        self.set_slots_to_setup_pose();
    }

    /// Restores bone locals and constraint mixes to their setup values.
    pub fn set_bones_to_setup_pose(&mut self) {
        for (bone, data) in self.bones.iter_mut().zip(&self.data.bones) {
            bone.transform_mode = data.transform_mode;
            bone.x = data.x;
            bone.y = data.y;
            bone.rotation = data.rotation;
            bone.scale_x = data.scale_x;
            bone.scale_y = data.scale_y;
            bone.shear_x = data.shear_x;
            bone.shear_y = data.shear_y;
        }

        for c in &mut self.ik_constraints {
            let data = &self.data.ik_constraints[c.data_index];
            c.mix = data.mix;
            c.bend_direction = data.bend_direction;
        }

        for c in &mut self.transform_constraints {
            let data = &self.data.transform_constraints[c.data_index];
            c.rotate_mix = data.rotate_mix;
            c.translate_mix = data.translate_mix;
            c.scale_mix = data.scale_mix;
            c.shear_mix = data.shear_mix;
        }

        for c in &mut self.path_constraints {
            let data = &self.data.path_constraints[c.data_index];
            c.position = data.position;
            c.spacing = data.spacing;
            c.rotate_mix = data.rotate_mix;
            c.translate_mix = data.translate_mix;
        }
    }

    /// Restores slot colors, setup attachments and the setup draw order.
    pub fn set_slots_to_setup_pose(&mut self) {
        self.draw_order = (0..self.slots.len()).collect();
        for slot_index in 0..self.slots.len() {
            let data = Arc::clone(&self.data);
            let slot_data = &data.slots[slot_index];
            {
                let slot = &mut self.slots[slot_index];
                slot.color = slot_data.color;
                slot.dark_color = slot_data.dark_color;
                slot.attachment = None;
                slot.attachment_skin = None;
            }
            self.set_slot_attachment(slot_index, slot_data.attachment.as_deref());
            let slot = &mut self.slots[slot_index];
            slot.attachment_time = self.time;
            slot.deform.clear();
        }
    }

    pub fn find_bone(&self, name: &str) -> Option<usize> {
        self.data.find_bone(name)
    }

    pub fn find_slot(&self, name: &str) -> Option<usize> {
        self.data.find_slot(name)
    }

    pub fn find_ik_constraint(&self, name: &str) -> Option<usize> {
        self.data.find_ik_constraint(name)
    }

    pub fn find_transform_constraint(&self, name: &str) -> Option<usize> {
        self.data.find_transform_constraint(name)
    }

    pub fn find_path_constraint(&self, name: &str) -> Option<usize> {
        self.data.find_path_constraint(name)
    }

    pub fn bone_index(&self, name: &str) -> Result<usize, Error> {
        self.find_bone(name)
            .ok_or_else(|| Error::not_found("bone", name))
    }

    pub fn slot_index(&self, name: &str) -> Result<usize, Error> {
        self.find_slot(name)
            .ok_or_else(|| Error::not_found("slot", name))
    }

    pub fn ik_constraint_index(&self, name: &str) -> Result<usize, Error> {
        self.find_ik_constraint(name)
            .ok_or_else(|| Error::not_found("ik constraint", name))
    }

    pub fn transform_constraint_index(&self, name: &str) -> Result<usize, Error> {
        self.find_transform_constraint(name)
            .ok_or_else(|| Error::not_found("transform constraint", name))
    }

    pub fn path_constraint_index(&self, name: &str) -> Result<usize, Error> {
        self.find_path_constraint(name)
            .ok_or_else(|| Error::not_found("path constraint", name))
    }

    /// Sets the active skin. Slots showing an attachment from the previous skin switch to the
    /// new skin's attachment of the same name; without a previous skin, slots whose setup
    /// attachment exists in the new skin show it.
    pub fn set_skin(&mut self, skin_name: Option<&str>) -> Result<(), Error> {
        let Some(name) = skin_name else {
            self.skin = None;
            self.update_cache();
            return Ok(());
        };
        let data = Arc::clone(&self.data);
        let new_skin = data.skin(name).ok_or_else(|| Error::not_found("skin", name))?;

        match self.skin.clone() {
            None => {
                for (slot_index, slot_data) in data.slots.iter().enumerate() {
                    let Some(setup_name) = slot_data.attachment.as_deref() else {
                        continue;
                    };
                    if new_skin.attachment(slot_index, setup_name).is_some() {
                        self.assign_slot_attachment(
                            slot_index,
                            Some((setup_name.to_string(), name.to_string())),
                        );
                    }
                }
            }
            Some(old_skin) => {
                for slot_index in 0..self.slots.len() {
                    let slot = &self.slots[slot_index];
                    if slot.attachment_skin.as_deref() != Some(old_skin.as_str()) {
                        continue;
                    }
                    let Some(current) = slot.attachment.clone() else {
                        continue;
                    };
                    if new_skin.attachment(slot_index, &current).is_some() {
                        self.assign_slot_attachment(
                            slot_index,
                            Some((current, name.to_string())),
                        );
                    }
                }
            }
        }

        self.skin = Some(name.to_string());
        log::debug!("skin set to '{name}'");
        self.update_cache();
        Ok(())
    }

    /// Looks an attachment up in the active skin, then in the default skin.
    pub fn attachment(&self, slot_index: usize, attachment_name: &str) -> Option<&AttachmentData> {
        self.resolve_attachment(slot_index, attachment_name)
            .map(|(attachment, _)| attachment)
    }

    fn resolve_attachment(
        &self,
        slot_index: usize,
        attachment_name: &str,
    ) -> Option<(&AttachmentData, &str)> {
        if let Some(skin_name) = self.skin.as_deref() {
            if let Some(att) = self
                .data
                .skin(skin_name)
                .and_then(|s| s.attachment(slot_index, attachment_name))
            {
                return Some((att, skin_name));
            }
        }
        self.data
            .default_skin()
            .and_then(|s| s.attachment(slot_index, attachment_name))
            .map(|att| (att, DEFAULT_SKIN_NAME))
    }

    /// The attachment currently shown by a slot.
    pub fn slot_attachment_data(&self, slot_index: usize) -> Option<&AttachmentData> {
        let slot = self.slots.get(slot_index)?;
        let name = slot.attachment.as_deref()?;
        if let Some(source_skin) = slot.attachment_skin.as_deref() {
            if let Some(att) = self
                .data
                .skin(source_skin)
                .and_then(|s| s.attachment(slot_index, name))
            {
                return Some(att);
            }
        }
        self.attachment(slot_index, name)
    }

    /// Shows the named attachment on a slot, or clears it with `None`.
    pub fn set_attachment(
        &mut self,
        slot_name: &str,
        attachment_name: Option<&str>,
    ) -> Result<(), Error> {
        let slot_index = self.slot_index(slot_name)?;
        match attachment_name {
            None => {
                self.assign_slot_attachment(slot_index, None);
                Ok(())
            }
            Some(name) => {
                let (_, skin) = self
                    .resolve_attachment(slot_index, name)
                    .ok_or_else(|| Error::not_found("attachment", name))?;
                let skin = skin.to_string();
                self.assign_slot_attachment(slot_index, Some((name.to_string(), skin)));
                Ok(())
            }
        }
    }

    /// Shows the named attachment on a slot when it resolves through the active or default
    /// skin; an unresolvable name clears the slot.
    pub fn set_slot_attachment(&mut self, slot_index: usize, attachment_name: Option<&str>) {
        let resolved = attachment_name.and_then(|name| {
            self.resolve_attachment(slot_index, name)
                .map(|(_, skin)| (name.to_string(), skin.to_string()))
        });
        self.assign_slot_attachment(slot_index, resolved);
    }

    fn assign_slot_attachment(&mut self, slot_index: usize, resolved: Option<(String, String)>) {
        let time = self.time;
        let slot = &mut self.slots[slot_index];
        let (name, skin) = match resolved {
            Some((name, skin)) => (Some(name), Some(skin)),
            None => (None, None),
        };
        if slot.attachment == name && slot.attachment_skin == skin {
            return;
        }
        slot.attachment = name;
        slot.attachment_skin = skin;
        slot.attachment_time = time;
        slot.deform.clear();
    }

    /// Seconds since the slot's attachment last changed.
    pub fn slot_attachment_time(&self, slot_index: usize) -> f32 {
        self.slots
            .get(slot_index)
            .map_or(0.0, |slot| self.time - slot.attachment_time)
    }

    pub fn set_slot_attachment_time(&mut self, slot_index: usize, time: f32) {
        let now = self.time;
        if let Some(slot) = self.slots.get_mut(slot_index) {
            slot.attachment_time = now - time;
        }
    }

    /// Axis-aligned bounds of every visible vertex attachment, as `[min_x, min_y, max_x, max_y]`.
    pub fn bounds(&self) -> Option<[f32; 4]> {
        let mut bounds: Option<[f32; 4]> = None;
        for &slot_index in &self.draw_order {
            let Some(vertices) = self.slot_world_vertices(slot_index) else {
                continue;
            };
            for point in vertices.chunks_exact(2) {
                let b = bounds.get_or_insert([point[0], point[1], point[0], point[1]]);
                b[0] = b[0].min(point[0]);
                b[1] = b[1].min(point[1]);
                b[2] = b[2].max(point[0]);
                b[3] = b[3].max(point[1]);
            }
        }
        bounds
    }

    /// Snapshot of the current pose for inspection or serialization.
    pub fn pose(&self) -> SkeletonPose {
        let bones = self
            .bones
            .iter()
            .map(|bone| BonePose {
                name: self.data.bones[bone.data_index].name.clone(),
                x: bone.x,
                y: bone.y,
                rotation: bone.rotation,
                scale_x: bone.scale_x,
                scale_y: bone.scale_y,
                shear_x: bone.shear_x,
                shear_y: bone.shear_y,
                world: [bone.a, bone.b, bone.c, bone.d, bone.world_x, bone.world_y],
            })
            .collect();
        let slots = self
            .draw_order
            .iter()
            .map(|&slot_index| {
                let slot = &self.slots[slot_index];
                SlotPose {
                    name: self.data.slots[slot.data_index].name.clone(),
                    bone: self.data.bones[slot.bone].name.clone(),
                    attachment: slot.attachment.clone(),
                    color: slot.color,
                    dark_color: slot.dark_color,
                }
            })
            .collect();
        SkeletonPose { bones, slots }
    }
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BonePose {
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub shear_x: f32,
    pub shear_y: f32,
    /// `[a, b, c, d, world_x, world_y]`.
    pub world: [f32; 6],
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SlotPose {
    pub name: String,
    pub bone: String,
    pub attachment: Option<String>,
    pub color: [f32; 4],
    pub dark_color: Option<[f32; 3]>,
}

/// Bones in setup order and slots in draw order.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SkeletonPose {
    pub bones: Vec<BonePose>,
    pub slots: Vec<SlotPose>,
}

fn local_matrix(t: &LocalTransform) -> (f32, f32, f32, f32) {
    let rotation_x = (t.rotation + t.shear_x).to_radians();
    let rotation_y = (t.rotation + 90.0 + t.shear_y).to_radians();
    (
        rotation_x.cos() * t.scale_x,
        rotation_y.cos() * t.scale_y,
        rotation_x.sin() * t.scale_x,
        rotation_y.sin() * t.scale_y,
    )
}

fn update_world_transform_root(
    bone: &mut Bone,
    t: LocalTransform,
    skeleton_x: f32,
    skeleton_y: f32,
    flip_x: bool,
    flip_y: bool,
) {
    let (mut la, mut lb, mut lc, mut ld) = local_matrix(&t);
    let mut x = t.x;
    let mut y = t.y;
    if flip_x {
        x = -x;
        la = -la;
        lb = -lb;
    }
    if flip_y {
        y = -y;
        lc = -lc;
        ld = -ld;
    }
    bone.a = la;
    bone.b = lb;
    bone.c = lc;
    bone.d = ld;
    bone.world_x = x + skeleton_x;
    bone.world_y = y + skeleton_y;
}

fn update_world_transform_child(
    bone: &mut Bone,
    t: LocalTransform,
    parent: &ParentTransform,
    flip_x: bool,
    flip_y: bool,
) {
    let mut pa = parent.a;
    let mut pb = parent.b;
    let mut pc = parent.c;
    let mut pd = parent.d;

    bone.world_x = pa * t.x + pb * t.y + parent.world_x;
    bone.world_y = pc * t.x + pd * t.y + parent.world_y;

    match bone.transform_mode {
        TransformMode::Normal => {
            let (la, lb, lc, ld) = local_matrix(&t);
            bone.a = pa * la + pb * lc;
            bone.b = pa * lb + pb * ld;
            bone.c = pc * la + pd * lc;
            bone.d = pc * lb + pd * ld;
            return;
        }
        TransformMode::OnlyTranslation => {
            let (la, lb, lc, ld) = local_matrix(&t);
            bone.a = la;
            bone.b = lb;
            bone.c = lc;
            bone.d = ld;
        }
        TransformMode::NoRotationOrReflection => {
            let mut s = pa * pa + pc * pc;
            let prx;
            if s > 1.0e-4 {
                s = (pa * pd - pb * pc).abs() / s;
                pb = pc * s;
                pd = pa * s;
                prx = pc.atan2(pa).to_degrees();
            } else {
                pa = 0.0;
                pc = 0.0;
                prx = 90.0 - pd.atan2(pb).to_degrees();
            }

            let rotation_x = (t.rotation + t.shear_x - prx).to_radians();
            let rotation_y = (t.rotation + t.shear_y - prx + 90.0).to_radians();
            let la = rotation_x.cos() * t.scale_x;
            let lb = rotation_y.cos() * t.scale_y;
            let lc = rotation_x.sin() * t.scale_x;
            let ld = rotation_y.sin() * t.scale_y;

            bone.a = pa * la - pb * lc;
            bone.b = pa * lb - pb * ld;
            bone.c = pc * la + pd * lc;
            bone.d = pc * lb + pd * ld;
        }
        TransformMode::NoScale | TransformMode::NoScaleOrReflection => {
            let (sin, cos) = t.rotation.to_radians().sin_cos();
            let mut za = pa * cos + pb * sin;
            let mut zc = pc * cos + pd * sin;
            let mut s = (za * za + zc * zc).sqrt();
            if s > 1.0e-5 {
                s = 1.0 / s;
            }
            za *= s;
            zc *= s;
            s = (za * za + zc * zc).sqrt();
            let r = std::f32::consts::FRAC_PI_2 + zc.atan2(za);
            let mut zb = r.cos() * s;
            let mut zd = r.sin() * s;

            let shear_x = t.shear_x.to_radians();
            let shear_y = (90.0 + t.shear_y).to_radians();
            let la = shear_x.cos() * t.scale_x;
            let lb = shear_y.cos() * t.scale_y;
            let lc = shear_x.sin() * t.scale_x;
            let ld = shear_y.sin() * t.scale_y;

            let reflect = if bone.transform_mode == TransformMode::NoScaleOrReflection {
                flip_x != flip_y
            } else {
                pa * pd - pb * pc < 0.0
            };
            if reflect {
                zb = -zb;
                zd = -zd;
            }

            bone.a = za * la + zb * lc;
            bone.b = za * lb + zb * ld;
            bone.c = zc * la + zd * lc;
            bone.d = zc * lb + zd * ld;
            return;
        }
    }

    if flip_x {
        bone.a = -bone.a;
        bone.b = -bone.b;
    }
    if flip_y {
        bone.c = -bone.c;
        bone.d = -bone.d;
    }
}

fn sort_reset(bones: &mut [Bone], children: &[Vec<usize>], indices: &[usize]) {
    for &index in indices {
        if bones[index].sorted {
            sort_reset(bones, children, &children[index]);
        }
        bones[index].sorted = false;
    }
}

fn build_bone_children_indices(bones: &[Bone]) -> Vec<Vec<usize>> {
    let mut children = vec![Vec::<usize>::new(); bones.len()];
    for (index, bone) in bones.iter().enumerate() {
        if let Some(parent) = bone.parent {
            if parent < children.len() {
                children[parent].push(index);
            }
        }
    }
    children
}
