use crate::test_support::{assert_approx, region, root_only, rotate, translate, vec2_frames};
use crate::{
    Animation, AttachmentFrame, AttachmentTimeline, BoneData, ColorFrame, ColorTimeline, Curve,
    DrawOrderFrame, DrawOrderTimeline, EventData, EventTimeline, IkConstraintData,
    IkConstraintTimeline, IkFrame, MixDirection, MixPose, RotateFrame, ScaleTimeline, Skeleton,
    SkeletonDataBuilder, SkinData, SlotData, Timeline, frame_index,
};

fn apply(
    animation: &Animation,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    pose: MixPose,
    direction: MixDirection,
) {
    animation
        .apply(skeleton, -1.0, time, false, None, alpha, pose, direction)
        .unwrap();
}

#[test]
fn frame_index_is_first_key_after_time() {
    let frames = [
        RotateFrame {
            time: 0.0,
            angle: 0.0,
            curve: Curve::Linear,
        },
        RotateFrame {
            time: 0.5,
            angle: 0.0,
            curve: Curve::Linear,
        },
        RotateFrame {
            time: 1.0,
            angle: 0.0,
            curve: Curve::Linear,
        },
    ];
    assert_eq!(frame_index(&frames, -0.1), 0);
    assert_eq!(frame_index(&frames, 0.0), 1);
    assert_eq!(frame_index(&frames, 0.25), 1);
    assert_eq!(frame_index(&frames, 0.5), 2);
    assert_eq!(frame_index(&frames, 0.75), 2);
    assert_eq!(frame_index(&frames, 1.0), 3);
}

#[test]
fn translate_interpolates_between_keys_and_holds_after_last() {
    let animation = Animation::new("move", vec![translate(0, &[(0.0, 0.0, 0.0), (1.0, 10.0, -4.0)])]);
    let data = root_only(vec![animation.clone()]);
    let mut skeleton = Skeleton::new(data);

    apply(&animation, &mut skeleton, 0.25, 1.0, MixPose::Setup, MixDirection::In);
    assert_approx(skeleton.bones[0].x, 2.5);
    assert_approx(skeleton.bones[0].y, -1.0);

    apply(&animation, &mut skeleton, 3.0, 1.0, MixPose::Setup, MixDirection::In);
    assert_approx(skeleton.bones[0].x, 10.0);
    assert_approx(skeleton.bones[0].y, -4.0);
}

#[test]
fn before_first_key_depends_on_pose() {
    let animation = Animation::new("late", vec![translate(0, &[(0.5, 10.0, 0.0), (1.0, 20.0, 0.0)])]);
    let mut root = BoneData::new("root", None);
    root.x = 4.0;
    let data = SkeletonDataBuilder::new()
        .bone(root)
        .animation(animation.clone())
        .build()
        .unwrap();
    let mut skeleton = Skeleton::new(data);

    skeleton.bones[0].x = 8.0;
    apply(&animation, &mut skeleton, 0.1, 0.5, MixPose::CurrentLayered, MixDirection::In);
    assert_approx(skeleton.bones[0].x, 8.0);

    apply(&animation, &mut skeleton, 0.1, 0.5, MixPose::Current, MixDirection::In);
    assert_approx(skeleton.bones[0].x, 6.0);

    apply(&animation, &mut skeleton, 0.1, 0.5, MixPose::Setup, MixDirection::In);
    assert_approx(skeleton.bones[0].x, 4.0);
}

#[test]
fn rotation_between_keys_takes_the_short_way() {
    let animation = Animation::new("spin", vec![rotate(0, &[(0.0, 350.0), (1.0, 10.0)])]);
    let data = root_only(vec![animation.clone()]);
    let mut skeleton = Skeleton::new(data);

    apply(&animation, &mut skeleton, 0.5, 1.0, MixPose::Setup, MixDirection::In);
    assert_approx(skeleton.bones[0].rotation, 0.0);

    apply(&animation, &mut skeleton, 0.25, 1.0, MixPose::Setup, MixDirection::In);
    assert_approx(skeleton.bones[0].rotation, -5.0);
}

#[test]
fn rotation_blend_from_350_toward_10_passes_through_zero() {
    let animation = Animation::new("ten", vec![rotate(0, &[(0.0, 10.0)])]);
    let data = root_only(vec![animation.clone()]);
    let mut skeleton = Skeleton::new(data);

    skeleton.bones[0].rotation = 350.0;
    apply(&animation, &mut skeleton, 0.0, 0.5, MixPose::Current, MixDirection::In);
    assert_approx(skeleton.bones[0].rotation, 360.0);

    skeleton.bones[0].rotation = 350.0;
    apply(&animation, &mut skeleton, 0.0, 0.25, MixPose::Current, MixDirection::In);
    assert_approx(skeleton.bones[0].rotation, 355.0);
}

#[test]
fn stepped_curve_holds_previous_key() {
    let animation = Animation::new(
        "step",
        vec![Timeline::Rotate(crate::RotateTimeline {
            bone_index: 0,
            frames: vec![
                RotateFrame {
                    time: 0.0,
                    angle: 0.0,
                    curve: Curve::Stepped,
                },
                RotateFrame {
                    time: 1.0,
                    angle: 90.0,
                    curve: Curve::Linear,
                },
            ],
        })],
    );
    let data = root_only(vec![animation.clone()]);
    let mut skeleton = Skeleton::new(data);

    apply(&animation, &mut skeleton, 0.99, 1.0, MixPose::Setup, MixDirection::In);
    assert_approx(skeleton.bones[0].rotation, 0.0);
    apply(&animation, &mut skeleton, 1.0, 1.0, MixPose::Setup, MixDirection::In);
    assert_approx(skeleton.bones[0].rotation, 90.0);
}

#[test]
fn scale_keeps_base_sign_when_mixing_out() {
    let animation = Animation::new(
        "flip",
        vec![Timeline::Scale(ScaleTimeline {
            bone_index: 0,
            frames: vec2_frames(&[(0.0, -2.0, 1.0)]),
        })],
    );
    let data = root_only(vec![animation.clone()]);
    let mut skeleton = Skeleton::new(data);

    apply(&animation, &mut skeleton, 0.0, 0.5, MixPose::Setup, MixDirection::Out);
    // |-2| keeps the setup sign: 1 + (2 - 1) * 0.5.
    assert_approx(skeleton.bones[0].scale_x, 1.5);

    apply(&animation, &mut skeleton, 0.0, 0.5, MixPose::Setup, MixDirection::In);
    // The setup scale takes the key sign: -1 + (-2 + 1) * 0.5.
    assert_approx(skeleton.bones[0].scale_x, -1.5);

    apply(&animation, &mut skeleton, 0.0, 1.0, MixPose::Setup, MixDirection::In);
    assert_approx(skeleton.bones[0].scale_x, -2.0);
}

fn slot_skeleton(animation: Animation) -> Skeleton {
    let mut skin = SkinData::new("default");
    skin.set_attachment(0, "a", region(10.0, 10.0));
    skin.set_attachment(0, "b", region(20.0, 20.0));
    let mut slot = SlotData::new("body", 0);
    slot.attachment = Some("a".to_string());
    let data = SkeletonDataBuilder::new()
        .bone(BoneData::new("root", None))
        .slot(slot)
        .slot(SlotData::new("front", 0))
        .skin(skin)
        .animation(animation)
        .build()
        .unwrap();
    Skeleton::new(data)
}

#[test]
fn attachment_timeline_switches_and_resets_when_mixing_out() {
    let animation = Animation::new(
        "swap",
        vec![Timeline::Attachment(AttachmentTimeline {
            slot_index: 0,
            frames: vec![
                AttachmentFrame {
                    time: 0.5,
                    name: Some("b".to_string()),
                },
                AttachmentFrame {
                    time: 1.0,
                    name: None,
                },
            ],
        })],
    );
    let mut skeleton = slot_skeleton(animation.clone());
    assert_eq!(skeleton.slots[0].attachment.as_deref(), Some("a"));

    apply(&animation, &mut skeleton, 0.75, 1.0, MixPose::Setup, MixDirection::In);
    assert_eq!(skeleton.slots[0].attachment.as_deref(), Some("b"));

    apply(&animation, &mut skeleton, 1.0, 1.0, MixPose::Current, MixDirection::In);
    assert_eq!(skeleton.slots[0].attachment, None);

    apply(&animation, &mut skeleton, 0.75, 1.0, MixPose::Setup, MixDirection::Out);
    assert_eq!(skeleton.slots[0].attachment.as_deref(), Some("a"));

    skeleton.set_slot_attachment(0, Some("b"));
    apply(&animation, &mut skeleton, 0.1, 1.0, MixPose::Current, MixDirection::In);
    assert_eq!(skeleton.slots[0].attachment.as_deref(), Some("b"));
    apply(&animation, &mut skeleton, 0.1, 1.0, MixPose::Setup, MixDirection::In);
    assert_eq!(skeleton.slots[0].attachment.as_deref(), Some("a"));
}

#[test]
fn draw_order_timeline_reorders_slots() {
    let animation = Animation::new(
        "order",
        vec![Timeline::DrawOrder(DrawOrderTimeline {
            frames: vec![
                DrawOrderFrame {
                    time: 0.0,
                    draw_order: Some(vec![1, 0]),
                },
                DrawOrderFrame {
                    time: 1.0,
                    draw_order: None,
                },
            ],
        })],
    );
    let mut skeleton = slot_skeleton(animation.clone());
    assert_eq!(skeleton.draw_order, vec![0, 1]);

    apply(&animation, &mut skeleton, 0.5, 1.0, MixPose::Current, MixDirection::In);
    assert_eq!(skeleton.draw_order, vec![1, 0]);

    apply(&animation, &mut skeleton, 1.0, 1.0, MixPose::Current, MixDirection::In);
    assert_eq!(skeleton.draw_order, vec![0, 1]);
}

#[test]
fn color_timeline_blends_from_setup() {
    let animation = Animation::new(
        "fade",
        vec![Timeline::Color(ColorTimeline {
            slot_index: 0,
            frames: vec![ColorFrame {
                time: 0.0,
                color: [0.0, 0.0, 0.0, 0.0],
                curve: Curve::Linear,
            }],
        })],
    );
    let mut skeleton = slot_skeleton(animation.clone());

    apply(&animation, &mut skeleton, 0.0, 0.25, MixPose::Setup, MixDirection::In);
    for channel in skeleton.slots[0].color {
        assert_approx(channel, 0.75);
    }
    apply(&animation, &mut skeleton, 0.0, 0.5, MixPose::Current, MixDirection::In);
    for channel in skeleton.slots[0].color {
        assert_approx(channel, 0.375);
    }
}

fn event_animation() -> Animation {
    let beat = EventData::new("beat");
    let mut step = EventData::new("step");
    step.int_value = 3;
    Animation::new(
        "events",
        vec![
            rotate(0, &[(0.0, 0.0), (1.0, 0.0)]),
            Timeline::Event(EventTimeline {
                events: vec![beat.event_at(0.0), step.event_at(0.5), beat.event_at(0.5)],
            }),
        ],
    )
}

fn fired(
    animation: &Animation,
    skeleton: &mut Skeleton,
    last: f32,
    time: f32,
    looped: bool,
) -> Vec<(String, f32)> {
    let mut events = Vec::new();
    animation.apply(
        skeleton,
        last,
        time,
        looped,
        Some(&mut events),
        1.0,
        MixPose::Setup,
        MixDirection::In,
    )
    .unwrap();
    events.into_iter().map(|e| (e.name, e.time)).collect()
}

#[test]
fn events_fire_once_in_half_open_interval() {
    let animation = event_animation();
    let data = root_only(vec![animation.clone()]);
    let mut skeleton = Skeleton::new(data);

    assert_eq!(
        fired(&animation, &mut skeleton, -1.0, 0.25, false),
        vec![("beat".to_string(), 0.0)]
    );
    assert_eq!(fired(&animation, &mut skeleton, 0.0, 0.25, false), Vec::new());
    assert_eq!(
        fired(&animation, &mut skeleton, 0.25, 0.5, false),
        vec![("step".to_string(), 0.5), ("beat".to_string(), 0.5)]
    );
    assert_eq!(fired(&animation, &mut skeleton, 0.5, 0.75, false), Vec::new());
}

#[test]
fn looping_events_fire_to_the_end_then_from_the_start() {
    let animation = event_animation();
    let data = root_only(vec![animation.clone()]);
    let mut skeleton = Skeleton::new(data);

    assert_eq!(
        fired(&animation, &mut skeleton, 0.25, 1.1, true),
        vec![
            ("step".to_string(), 0.5),
            ("beat".to_string(), 0.5),
            ("beat".to_string(), 0.0)
        ]
    );
}

#[test]
fn ik_bend_direction_only_changes_when_mixing_in() {
    let animation = Animation::new(
        "bend",
        vec![Timeline::IkConstraint(IkConstraintTimeline {
            constraint_index: 0,
            frames: vec![IkFrame {
                time: 0.0,
                mix: 0.0,
                bend_direction: -1,
                curve: Curve::Linear,
            }],
        })],
    );
    let mut child = BoneData::new("child", Some(0));
    child.length = 10.0;
    let data = SkeletonDataBuilder::new()
        .bone(BoneData::new("root", None))
        .bone(child)
        .bone(BoneData::new("target", None))
        .ik_constraint(IkConstraintData::new("ik", vec![0, 1], 2))
        .animation(animation.clone())
        .build()
        .unwrap();
    let mut skeleton = Skeleton::new(data);

    apply(&animation, &mut skeleton, 0.0, 0.5, MixPose::Current, MixDirection::Out);
    assert_approx(skeleton.ik_constraints[0].mix, 0.5);
    assert_eq!(skeleton.ik_constraints[0].bend_direction, 1);

    apply(&animation, &mut skeleton, 0.0, 0.5, MixPose::Current, MixDirection::In);
    assert_approx(skeleton.ik_constraints[0].mix, 0.25);
    assert_eq!(skeleton.ik_constraints[0].bend_direction, -1);

    apply(&animation, &mut skeleton, 0.0, 0.5, MixPose::Setup, MixDirection::Out);
    assert_approx(skeleton.ik_constraints[0].mix, 0.5);
    assert_eq!(skeleton.ik_constraints[0].bend_direction, 1);
}

#[test]
fn looping_apply_wraps_time() {
    let animation = Animation::new("walk", vec![rotate(0, &[(0.0, 0.0), (1.0, 90.0)])]);
    let data = root_only(vec![animation.clone()]);
    let mut skeleton = Skeleton::new(data);

    let pose = (MixPose::Setup, MixDirection::In);
    animation.apply(&mut skeleton, -1.0, 2.5, true, None, 1.0, pose.0, pose.1).unwrap();
    assert_approx(skeleton.bones[0].rotation, 45.0);

    animation.apply(&mut skeleton, -1.0, 2.5, false, None, 1.0, pose.0, pose.1).unwrap();
    assert_approx(skeleton.bones[0].rotation, 90.0);
}
