use crate::{
    Animation, AttachmentData, BoneData, Curve, RegionAttachmentData, RotateFrame,
    RotateTimeline, SkeletonData, SkeletonDataBuilder, Timeline, TranslateTimeline, Vec2Frame,
};
use std::sync::Arc;

#[track_caller]
pub(crate) fn assert_approx(actual: f32, expected: f32) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= 1.0e-3,
        "expected {expected}, got {actual} (diff {diff})"
    );
}

pub(crate) fn rotate(bone_index: usize, keys: &[(f32, f32)]) -> Timeline {
    Timeline::Rotate(RotateTimeline {
        bone_index,
        frames: keys
            .iter()
            .map(|&(time, angle)| RotateFrame {
                time,
                angle,
                curve: Curve::Linear,
            })
            .collect(),
    })
}

pub(crate) fn vec2_frames(keys: &[(f32, f32, f32)]) -> Vec<Vec2Frame> {
    keys.iter()
        .map(|&(time, x, y)| Vec2Frame {
            time,
            x,
            y,
            curve: Curve::Linear,
        })
        .collect()
}

pub(crate) fn translate(bone_index: usize, keys: &[(f32, f32, f32)]) -> Timeline {
    Timeline::Translate(TranslateTimeline {
        bone_index,
        frames: vec2_frames(keys),
    })
}

/// A root bone plus a child bone of length 10 along +x.
pub(crate) fn two_bone_builder() -> SkeletonDataBuilder {
    let mut child = BoneData::new("child", Some(0));
    child.length = 10.0;
    child.x = 5.0;
    SkeletonDataBuilder::new()
        .bone(BoneData::new("root", None))
        .bone(child)
}

/// Single root bone with the given animations.
pub(crate) fn root_only(animations: Vec<Animation>) -> Arc<SkeletonData> {
    let mut builder = SkeletonDataBuilder::new().bone(BoneData::new("root", None));
    for animation in animations {
        builder = builder.animation(animation);
    }
    builder.build().expect("valid skeleton data")
}

pub(crate) fn region(width: f32, height: f32) -> AttachmentData {
    AttachmentData::Region(RegionAttachmentData {
        x: 0.0,
        y: 0.0,
        rotation: 0.0,
        scale_x: 1.0,
        scale_y: 1.0,
        width,
        height,
        color: [1.0; 4],
    })
}
