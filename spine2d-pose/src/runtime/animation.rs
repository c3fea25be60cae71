use crate::{
    Animation, AttachmentTimeline, ColorTimeline, Curve, DeformTimeline, DrawOrderTimeline, Error,
    Event, EventTimeline, IkConstraintTimeline, Keyframe, PathConstraintMixTimeline,
    PathConstraintPositionTimeline, PathConstraintSpacingTimeline, RotateFrame, RotateTimeline,
    ScaleTimeline, ShearTimeline, Skeleton, Timeline, TransformConstraintTimeline,
    TranslateTimeline, TwoColorTimeline, Vec2Frame,
};
use std::sync::Arc;

/// What a timeline blends from when `alpha < 1`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MixPose {
    /// Blend from the setup pose; before the first key the setup pose is restored.
    Setup,
    /// Blend from the current pose; before the first key the current pose blends toward setup.
    Current,
    /// Blend from the current pose; before the first key nothing changes.
    CurrentLayered,
}

/// Whether the animation is being mixed in or out.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MixDirection {
    In,
    Out,
}

impl Animation {
    /// Applies every timeline at `time`. Events keyed in `(last_time, time]` are appended to
    /// `events`. Looping wraps both times by the duration.
    ///
    /// Fails with [`Error::InvalidArgument`] when a timeline keys something the skeleton's data
    /// does not have; the skeleton is left untouched.
    #[allow(clippy::too_many_arguments)]
    pub fn apply(
        &self,
        skeleton: &mut Skeleton,
        mut last_time: f32,
        mut time: f32,
        looped: bool,
        mut events: Option<&mut Vec<Event>>,
        alpha: f32,
        pose: MixPose,
        direction: MixDirection,
    ) -> Result<(), Error> {
        skeleton.data.check_animation(self)?;
        if looped && self.duration != 0.0 {
            time %= self.duration;
            if last_time > 0.0 {
                last_time %= self.duration;
            }
        }

        for timeline in &self.timelines {
            apply_timeline(
                timeline,
                skeleton,
                last_time,
                time,
                events.as_deref_mut(),
                alpha,
                pose,
                direction,
            );
        }
        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn apply_timeline(
    timeline: &Timeline,
    skeleton: &mut Skeleton,
    last_time: f32,
    time: f32,
    events: Option<&mut Vec<Event>>,
    alpha: f32,
    pose: MixPose,
    direction: MixDirection,
) {
    match timeline {
        Timeline::Rotate(t) => apply_rotate(t, skeleton, time, alpha, pose),
        Timeline::Translate(t) => apply_translate(t, skeleton, time, alpha, pose),
        Timeline::Scale(t) => apply_scale(t, skeleton, time, alpha, pose, direction),
        Timeline::Shear(t) => apply_shear(t, skeleton, time, alpha, pose),
        Timeline::Color(t) => apply_color(t, skeleton, time, alpha, pose),
        Timeline::TwoColor(t) => apply_two_color(t, skeleton, time, alpha, pose),
        Timeline::Attachment(t) => apply_attachment(t, skeleton, time, pose, direction),
        Timeline::Deform(t) => apply_deform(t, skeleton, time, alpha, pose),
        Timeline::Event(t) => {
            if let Some(events) = events {
                apply_events(t, last_time, time, events);
            }
        }
        Timeline::DrawOrder(t) => apply_draw_order(t, skeleton, time, pose, direction),
        Timeline::IkConstraint(t) => {
            apply_ik_constraint_timeline(t, skeleton, time, alpha, pose, direction)
        }
        Timeline::TransformConstraint(t) => {
            apply_transform_constraint_timeline(t, skeleton, time, alpha, pose)
        }
        Timeline::PathConstraintPosition(t) => {
            apply_path_position_timeline(t, skeleton, time, alpha, pose)
        }
        Timeline::PathConstraintSpacing(t) => {
            apply_path_spacing_timeline(t, skeleton, time, alpha, pose)
        }
        Timeline::PathConstraintMix(t) => apply_path_mix_timeline(t, skeleton, time, alpha, pose),
    }
}

/// Index of the first key strictly after `time`.
pub fn frame_index<F: Keyframe>(frames: &[F], time: f32) -> usize {
    frames.partition_point(|f| f.time() <= time)
}

/// Eased percent between `frames[index - 1]` and `frames[index]` at `time`.
fn frame_percent<F: Keyframe>(frames: &[F], index: usize, time: f32, curve: &Curve) -> f32 {
    let prev_time = frames[index - 1].time();
    let frame_time = frames[index].time();
    curve.percent(1.0 - (time - frame_time) / (prev_time - frame_time))
}

/// Shortest signed equivalent of an angle in degrees, in `[-180, 180]`.
pub(crate) fn wrap_degrees(degrees: f32) -> f32 {
    degrees - (16384.0 - (16384.499999999996 - degrees as f64 / 360.0) as i32 as f32) * 360.0
}

fn sign(value: f32) -> f32 {
    if value < 0.0 {
        -1.0
    } else if value > 0.0 {
        1.0
    } else {
        0.0
    }
}

/// Keyed rotation offset at `time`, interpolating along the shorter arc. `time` must not be
/// before the first key.
pub(crate) fn sample_rotate(frames: &[RotateFrame], time: f32) -> f32 {
    let last = &frames[frames.len() - 1];
    if time >= last.time {
        return last.angle;
    }
    let index = frame_index(frames, time);
    let prev = &frames[index - 1];
    let percent = frame_percent(frames, index, time, &prev.curve);
    let r = wrap_degrees(frames[index].angle - prev.angle);
    prev.angle + r * percent
}

fn sample_vec2(frames: &[Vec2Frame], time: f32) -> (f32, f32) {
    let last = &frames[frames.len() - 1];
    if time >= last.time {
        return (last.x, last.y);
    }
    let index = frame_index(frames, time);
    let prev = &frames[index - 1];
    let next = &frames[index];
    let percent = frame_percent(frames, index, time, &prev.curve);
    (
        prev.x + (next.x - prev.x) * percent,
        prev.y + (next.y - prev.y) * percent,
    )
}

fn lerp<const N: usize>(from: [f32; N], to: [f32; N], alpha: f32) -> [f32; N] {
    let mut out = from;
    for (o, t) in out.iter_mut().zip(to) {
        *o += (t - *o) * alpha;
    }
    out
}

pub(crate) fn apply_rotate(
    timeline: &RotateTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    pose: MixPose,
) {
    let setup = skeleton.data.bones[timeline.bone_index].rotation;
    let bone = &mut skeleton.bones[timeline.bone_index];
    let frames = &timeline.frames;

    if time < frames[0].time {
        match pose {
            MixPose::Setup => bone.rotation = setup,
            MixPose::Current => bone.rotation += wrap_degrees(setup - bone.rotation) * alpha,
            MixPose::CurrentLayered => {}
        }
        return;
    }

    let last = &frames[frames.len() - 1];
    if time >= last.time {
        if pose == MixPose::Setup {
            bone.rotation = setup + last.angle * alpha;
        } else {
            bone.rotation += wrap_degrees(setup + last.angle - bone.rotation) * alpha;
        }
        return;
    }

    let r = sample_rotate(frames, time);
    if pose == MixPose::Setup {
        bone.rotation = setup + wrap_degrees(r) * alpha;
    } else {
        bone.rotation += wrap_degrees(setup + r - bone.rotation) * alpha;
    }
}

pub(crate) fn apply_translate(
    timeline: &TranslateTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    pose: MixPose,
) {
    let data = &skeleton.data.bones[timeline.bone_index];
    let bone = &mut skeleton.bones[timeline.bone_index];

    if time < timeline.frames[0].time {
        match pose {
            MixPose::Setup => {
                bone.x = data.x;
                bone.y = data.y;
            }
            MixPose::Current => {
                bone.x += (data.x - bone.x) * alpha;
                bone.y += (data.y - bone.y) * alpha;
            }
            MixPose::CurrentLayered => {}
        }
        return;
    }

    let (x, y) = sample_vec2(&timeline.frames, time);
    if pose == MixPose::Setup {
        bone.x = data.x + x * alpha;
        bone.y = data.y + y * alpha;
    } else {
        bone.x += (data.x + x - bone.x) * alpha;
        bone.y += (data.y + y - bone.y) * alpha;
    }
}

pub(crate) fn apply_scale(
    timeline: &ScaleTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    pose: MixPose,
    direction: MixDirection,
) {
    let data = &skeleton.data.bones[timeline.bone_index];
    let bone = &mut skeleton.bones[timeline.bone_index];

    if time < timeline.frames[0].time {
        match pose {
            MixPose::Setup => {
                bone.scale_x = data.scale_x;
                bone.scale_y = data.scale_y;
            }
            MixPose::Current => {
                bone.scale_x += (data.scale_x - bone.scale_x) * alpha;
                bone.scale_y += (data.scale_y - bone.scale_y) * alpha;
            }
            MixPose::CurrentLayered => {}
        }
        return;
    }

    let (kx, ky) = sample_vec2(&timeline.frames, time);
    let mut x = kx * data.scale_x;
    let mut y = ky * data.scale_y;
    if alpha == 1.0 {
        bone.scale_x = x;
        bone.scale_y = y;
        return;
    }

    let (mut bx, mut by) = if pose == MixPose::Setup {
        (data.scale_x, data.scale_y)
    } else {
        (bone.scale_x, bone.scale_y)
    };
    // Mixing out keeps the sign of the base pose, mixing in takes the sign of the key.
    if direction == MixDirection::Out {
        x = x.abs() * sign(bx);
        y = y.abs() * sign(by);
    } else {
        bx = bx.abs() * sign(x);
        by = by.abs() * sign(y);
    }
    bone.scale_x = bx + (x - bx) * alpha;
    bone.scale_y = by + (y - by) * alpha;
}

pub(crate) fn apply_shear(
    timeline: &ShearTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    pose: MixPose,
) {
    let data = &skeleton.data.bones[timeline.bone_index];
    let bone = &mut skeleton.bones[timeline.bone_index];

    if time < timeline.frames[0].time {
        match pose {
            MixPose::Setup => {
                bone.shear_x = data.shear_x;
                bone.shear_y = data.shear_y;
            }
            MixPose::Current => {
                bone.shear_x += (data.shear_x - bone.shear_x) * alpha;
                bone.shear_y += (data.shear_y - bone.shear_y) * alpha;
            }
            MixPose::CurrentLayered => {}
        }
        return;
    }

    let (x, y) = sample_vec2(&timeline.frames, time);
    if pose == MixPose::Setup {
        bone.shear_x = data.shear_x + x * alpha;
        bone.shear_y = data.shear_y + y * alpha;
    } else {
        bone.shear_x += (data.shear_x + x - bone.shear_x) * alpha;
        bone.shear_y += (data.shear_y + y - bone.shear_y) * alpha;
    }
}

pub(crate) fn apply_color(
    timeline: &ColorTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    pose: MixPose,
) {
    let setup = skeleton.data.slots[timeline.slot_index].color;
    let slot = &mut skeleton.slots[timeline.slot_index];
    let frames = &timeline.frames;

    if time < frames[0].time {
        match pose {
            MixPose::Setup => slot.color = setup,
            MixPose::Current => slot.color = lerp(slot.color, setup, alpha),
            MixPose::CurrentLayered => {}
        }
        return;
    }

    let last = &frames[frames.len() - 1];
    let color = if time >= last.time {
        last.color
    } else {
        let index = frame_index(frames, time);
        let prev = &frames[index - 1];
        let percent = frame_percent(frames, index, time, &prev.curve);
        lerp(prev.color, frames[index].color, percent)
    };

    if alpha == 1.0 {
        slot.color = color;
    } else {
        if pose == MixPose::Setup {
            slot.color = setup;
        }
        slot.color = lerp(slot.color, color, alpha);
    }
}

pub(crate) fn apply_two_color(
    timeline: &TwoColorTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    pose: MixPose,
) {
    let slot_data = &skeleton.data.slots[timeline.slot_index];
    let setup_light = slot_data.color;
    let setup_dark = slot_data.dark_color.unwrap_or([0.0; 3]);
    let slot = &mut skeleton.slots[timeline.slot_index];
    let frames = &timeline.frames;
    let current_dark = slot.dark_color.unwrap_or(setup_dark);

    if time < frames[0].time {
        match pose {
            MixPose::Setup => {
                slot.color = setup_light;
                slot.dark_color = Some(setup_dark);
            }
            MixPose::Current => {
                slot.color = lerp(slot.color, setup_light, alpha);
                slot.dark_color = Some(lerp(current_dark, setup_dark, alpha));
            }
            MixPose::CurrentLayered => {}
        }
        return;
    }

    let last = &frames[frames.len() - 1];
    let (light, dark) = if time >= last.time {
        (last.light, last.dark)
    } else {
        let index = frame_index(frames, time);
        let prev = &frames[index - 1];
        let next = &frames[index];
        let percent = frame_percent(frames, index, time, &prev.curve);
        (
            lerp(prev.light, next.light, percent),
            lerp(prev.dark, next.dark, percent),
        )
    };

    if alpha == 1.0 {
        slot.color = light;
        slot.dark_color = Some(dark);
    } else {
        let (base_light, base_dark) = if pose == MixPose::Setup {
            (setup_light, setup_dark)
        } else {
            (slot.color, current_dark)
        };
        slot.color = lerp(base_light, light, alpha);
        slot.dark_color = Some(lerp(base_dark, dark, alpha));
    }
}

fn reset_slot_attachment(skeleton: &mut Skeleton, slot_index: usize) {
    let data = Arc::clone(&skeleton.data);
    skeleton.set_slot_attachment(slot_index, data.slots[slot_index].attachment.as_deref());
}

pub(crate) fn apply_attachment(
    timeline: &AttachmentTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    pose: MixPose,
    direction: MixDirection,
) {
    let slot_index = timeline.slot_index;
    if direction == MixDirection::Out && pose == MixPose::Setup {
        reset_slot_attachment(skeleton, slot_index);
        return;
    }

    let frames = &timeline.frames;
    if time < frames[0].time {
        if pose == MixPose::Setup {
            reset_slot_attachment(skeleton, slot_index);
        }
        return;
    }

    let last = frames.len() - 1;
    let index = if time >= frames[last].time {
        last
    } else {
        frame_index(frames, time) - 1
    };
    skeleton.set_slot_attachment(slot_index, frames[index].name.as_deref());
}

pub(crate) fn apply_deform(
    timeline: &DeformTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    mut alpha: f32,
    pose: MixPose,
) {
    let data = Arc::clone(&skeleton.data);
    let Some(target_id) = data
        .skin(&timeline.skin)
        .and_then(|skin| skin.attachment(timeline.slot_index, &timeline.attachment))
        .and_then(|attachment| attachment.vertex_id())
    else {
        log::warn!(
            "deform timeline attachment '{}' not found in skin '{}'",
            timeline.attachment,
            timeline.skin
        );
        return;
    };
    let Some(attachment) = skeleton.slot_attachment_data(timeline.slot_index) else {
        return;
    };
    if attachment.deform_source_id() != Some(target_id) {
        return;
    }
    let Some(vertices) = attachment.vertices() else {
        return;
    };
    let weighted = vertices.is_weighted();
    let setup = vertices.setup_positions();
    let setup_at = |i: usize| setup.get(i).copied().unwrap_or(0.0);

    let frames = &timeline.frames;
    let vertex_count = frames[0].vertices.len();
    let deform = &mut skeleton.slots[timeline.slot_index].deform;
    if deform.len() != vertex_count && pose != MixPose::Setup {
        alpha = 1.0;
    }

    if time < frames[0].time {
        match pose {
            MixPose::Setup => deform.clear(),
            MixPose::Current => {
                if alpha == 1.0 {
                    deform.clear();
                    return;
                }
                deform.resize(vertex_count, 0.0);
                if weighted {
                    let keep = 1.0 - alpha;
                    for v in deform.iter_mut() {
                        *v *= keep;
                    }
                } else {
                    for (i, v) in deform.iter_mut().enumerate() {
                        *v += (setup_at(i) - *v) * alpha;
                    }
                }
            }
            MixPose::CurrentLayered => {}
        }
        return;
    }

    deform.resize(vertex_count, 0.0);

    let last = &frames[frames.len() - 1];
    if time >= last.time {
        let keyed = &last.vertices;
        if alpha == 1.0 {
            deform.copy_from_slice(keyed);
        } else if pose == MixPose::Setup {
            for (i, v) in deform.iter_mut().enumerate() {
                *v = if weighted {
                    keyed[i] * alpha
                } else {
                    setup_at(i) + (keyed[i] - setup_at(i)) * alpha
                };
            }
        } else {
            for (v, k) in deform.iter_mut().zip(keyed) {
                *v += (k - *v) * alpha;
            }
        }
        return;
    }

    let index = frame_index(frames, time);
    let prev = &frames[index - 1];
    let next = &frames[index];
    let percent = frame_percent(frames, index, time, &prev.curve);
    let value = |i: usize| prev.vertices[i] + (next.vertices[i] - prev.vertices[i]) * percent;

    if alpha == 1.0 {
        for (i, v) in deform.iter_mut().enumerate() {
            *v = value(i);
        }
    } else if pose == MixPose::Setup {
        for (i, v) in deform.iter_mut().enumerate() {
            *v = if weighted {
                value(i) * alpha
            } else {
                setup_at(i) + (value(i) - setup_at(i)) * alpha
            };
        }
    } else {
        for (i, v) in deform.iter_mut().enumerate() {
            *v += (value(i) - *v) * alpha;
        }
    }
}

/// Appends events keyed in `(last_time, time]`. When `last_time > time` the animation looped:
/// events after `last_time` fire first, then those from the start.
pub(crate) fn apply_events(
    timeline: &EventTimeline,
    mut last_time: f32,
    time: f32,
    fired: &mut Vec<Event>,
) {
    let frames = &timeline.events;
    let frame_count = frames.len();

    if last_time > time {
        apply_events(timeline, last_time, f32::MAX, fired);
        last_time = -1.0;
    } else if last_time >= frames[frame_count - 1].time {
        return;
    }
    if time < frames[0].time {
        return;
    }

    let mut frame = if last_time < frames[0].time {
        0
    } else {
        let mut frame = frame_index(frames, last_time);
        let frame_time = frames[frame.min(frame_count - 1)].time;
        // Fire every event sharing the key time.
        while frame > 0 && frame < frame_count && frames[frame - 1].time == frame_time {
            frame -= 1;
        }
        frame
    };
    while frame < frame_count && time >= frames[frame].time {
        fired.push(frames[frame].clone());
        frame += 1;
    }
}

pub(crate) fn apply_draw_order(
    timeline: &DrawOrderTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    pose: MixPose,
    direction: MixDirection,
) {
    let slot_count = skeleton.slots.len();
    if direction == MixDirection::Out && pose == MixPose::Setup {
        skeleton.draw_order = (0..slot_count).collect();
        return;
    }

    let frames = &timeline.frames;
    if time < frames[0].time {
        if pose == MixPose::Setup {
            skeleton.draw_order = (0..slot_count).collect();
        }
        return;
    }

    let last = frames.len() - 1;
    let index = if time >= frames[last].time {
        last
    } else {
        frame_index(frames, time) - 1
    };
    match &frames[index].draw_order {
        None => skeleton.draw_order = (0..slot_count).collect(),
        Some(order) => skeleton.draw_order.clone_from(order),
    }
}

pub(crate) fn apply_ik_constraint_timeline(
    timeline: &IkConstraintTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    pose: MixPose,
    direction: MixDirection,
) {
    let constraint = &mut skeleton.ik_constraints[timeline.constraint_index];
    let data = &skeleton.data.ik_constraints[constraint.data_index()];
    let frames = &timeline.frames;

    if time < frames[0].time {
        match pose {
            MixPose::Setup => {
                constraint.mix = data.mix;
                constraint.bend_direction = data.bend_direction;
            }
            MixPose::Current => {
                constraint.mix += (data.mix - constraint.mix) * alpha;
                constraint.bend_direction = data.bend_direction;
            }
            MixPose::CurrentLayered => {}
        }
        return;
    }

    let last = &frames[frames.len() - 1];
    let (mix, bend_direction) = if time >= last.time {
        (last.mix, last.bend_direction)
    } else {
        let index = frame_index(frames, time);
        let prev = &frames[index - 1];
        let percent = frame_percent(frames, index, time, &prev.curve);
        (
            prev.mix + (frames[index].mix - prev.mix) * percent,
            prev.bend_direction,
        )
    };

    if pose == MixPose::Setup {
        constraint.mix = data.mix + (mix - data.mix) * alpha;
        constraint.bend_direction = if direction == MixDirection::Out {
            data.bend_direction
        } else {
            bend_direction
        };
    } else {
        constraint.mix += (mix - constraint.mix) * alpha;
        if direction == MixDirection::In {
            constraint.bend_direction = bend_direction;
        }
    }
}

pub(crate) fn apply_transform_constraint_timeline(
    timeline: &TransformConstraintTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    pose: MixPose,
) {
    let constraint = &mut skeleton.transform_constraints[timeline.constraint_index];
    let data = &skeleton.data.transform_constraints[constraint.data_index()];
    let setup = [
        data.rotate_mix,
        data.translate_mix,
        data.scale_mix,
        data.shear_mix,
    ];
    let current = [
        constraint.rotate_mix,
        constraint.translate_mix,
        constraint.scale_mix,
        constraint.shear_mix,
    ];
    let frames = &timeline.frames;

    let mixes = if time < frames[0].time {
        match pose {
            MixPose::Setup => setup,
            MixPose::Current => lerp(current, setup, alpha),
            MixPose::CurrentLayered => return,
        }
    } else {
        let key = |f: &crate::TransformFrame| {
            [f.rotate_mix, f.translate_mix, f.scale_mix, f.shear_mix]
        };
        let last = &frames[frames.len() - 1];
        let keyed = if time >= last.time {
            key(last)
        } else {
            let index = frame_index(frames, time);
            let prev = &frames[index - 1];
            let percent = frame_percent(frames, index, time, &prev.curve);
            lerp(key(prev), key(&frames[index]), percent)
        };
        if pose == MixPose::Setup {
            lerp(setup, keyed, alpha)
        } else {
            lerp(current, keyed, alpha)
        }
    };

    let [rotate, translate, scale, shear] = mixes;
    constraint.rotate_mix = rotate;
    constraint.translate_mix = translate;
    constraint.scale_mix = scale;
    constraint.shear_mix = shear;
}

fn sample_float(frames: &[crate::FloatFrame], time: f32) -> f32 {
    let last = &frames[frames.len() - 1];
    if time >= last.time {
        return last.value;
    }
    let index = frame_index(frames, time);
    let prev = &frames[index - 1];
    let percent = frame_percent(frames, index, time, &prev.curve);
    prev.value + (frames[index].value - prev.value) * percent
}

/// Blends a single constraint value the way every float timeline does.
fn blend_float(
    current: &mut f32,
    setup: f32,
    keyed: Option<f32>,
    alpha: f32,
    pose: MixPose,
) {
    match (keyed, pose) {
        (None, MixPose::Setup) => *current = setup,
        (None, MixPose::Current) => *current += (setup - *current) * alpha,
        (None, MixPose::CurrentLayered) => {}
        (Some(value), MixPose::Setup) => *current = setup + (value - setup) * alpha,
        (Some(value), _) => *current += (value - *current) * alpha,
    }
}

pub(crate) fn apply_path_position_timeline(
    timeline: &PathConstraintPositionTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    pose: MixPose,
) {
    let constraint = &mut skeleton.path_constraints[timeline.constraint_index];
    let setup = skeleton.data.path_constraints[constraint.data_index()].position;
    let keyed = (time >= timeline.frames[0].time).then(|| sample_float(&timeline.frames, time));
    blend_float(&mut constraint.position, setup, keyed, alpha, pose);
}

pub(crate) fn apply_path_spacing_timeline(
    timeline: &PathConstraintSpacingTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    pose: MixPose,
) {
    let constraint = &mut skeleton.path_constraints[timeline.constraint_index];
    let setup = skeleton.data.path_constraints[constraint.data_index()].spacing;
    let keyed = (time >= timeline.frames[0].time).then(|| sample_float(&timeline.frames, time));
    blend_float(&mut constraint.spacing, setup, keyed, alpha, pose);
}

pub(crate) fn apply_path_mix_timeline(
    timeline: &PathConstraintMixTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    pose: MixPose,
) {
    let constraint = &mut skeleton.path_constraints[timeline.constraint_index];
    let data = &skeleton.data.path_constraints[constraint.data_index()];
    let frames = &timeline.frames;

    let keyed = if time < frames[0].time {
        None
    } else {
        let last = &frames[frames.len() - 1];
        Some(if time >= last.time {
            (last.rotate_mix, last.translate_mix)
        } else {
            let index = frame_index(frames, time);
            let prev = &frames[index - 1];
            let next = &frames[index];
            let percent = frame_percent(frames, index, time, &prev.curve);
            (
                prev.rotate_mix + (next.rotate_mix - prev.rotate_mix) * percent,
                prev.translate_mix + (next.translate_mix - prev.translate_mix) * percent,
            )
        })
    };

    blend_float(
        &mut constraint.rotate_mix,
        data.rotate_mix,
        keyed.map(|k| k.0),
        alpha,
        pose,
    );
    blend_float(
        &mut constraint.translate_mix,
        data.translate_mix,
        keyed.map(|k| k.1),
        alpha,
        pose,
    );
}
