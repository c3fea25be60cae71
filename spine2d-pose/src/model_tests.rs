use crate::test_support::{
    assert_approx, region, rotate, translate, two_bone_builder, vec2_frames,
};
use crate::{
    Animation, AttachmentData, BoneData, Curve, DeformFrame, DeformTimeline, DrawOrderFrame,
    DrawOrderTimeline, Error, IkConstraintData, MeshAttachmentData, MeshVertices, ScaleTimeline,
    SkeletonDataBuilder, SkinData, SlotData, Timeline,
};

fn mesh(vertex_count: usize, parent_mesh: Option<&str>, inherit_deform: bool) -> AttachmentData {
    AttachmentData::Mesh(MeshAttachmentData {
        vertex_id: 0,
        vertices: MeshVertices::Unweighted(vec![[0.0, 0.0]; vertex_count]),
        color: [1.0; 4],
        parent_mesh: parent_mesh.map(str::to_string),
        inherit_deform,
        deform_source_id: 0,
    })
}

fn invalid_data(result: Result<impl std::fmt::Debug, Error>) -> String {
    match result {
        Err(Error::InvalidData { message }) => message,
        other => panic!("expected invalid data, got {other:?}"),
    }
}

#[test]
fn curve_endpoints_are_fixed() {
    let curves = [
        Curve::Linear,
        Curve::Stepped,
        Curve::bezier(0.25, 0.1, 0.25, 1.0),
    ];
    for curve in &curves {
        assert_eq!(curve.percent(0.0), 0.0, "{curve:?}");
        assert_eq!(curve.percent(1.0), 1.0, "{curve:?}");
    }
    assert_eq!(Curve::Stepped.percent(0.5), 0.0);
    assert_eq!(Curve::Linear.percent(0.5), 0.5);
    assert_eq!(Curve::Linear.percent(1.5), 1.0);
}

#[test]
fn bezier_curve_samples_shape() {
    let straight = Curve::bezier(1.0 / 3.0, 1.0 / 3.0, 2.0 / 3.0, 2.0 / 3.0);
    for p in [0.05, 0.37, 0.5, 0.93] {
        assert_approx(straight.percent(p), p);
    }

    let ease = Curve::bezier(0.5, 0.0, 0.5, 1.0);
    assert_approx(ease.percent(0.5), 0.5);
    assert!(ease.percent(0.2) < 0.2);
    assert!(ease.percent(0.8) > 0.8);

    let mut last = 0.0;
    for i in 1..=20 {
        let value = ease.percent(i as f32 / 20.0);
        assert!(value >= last, "not monotonic at {i}");
        last = value;
    }
}

#[test]
fn animation_duration_is_last_key() {
    let animation = Animation::new(
        "wave",
        vec![
            rotate(0, &[(0.0, 0.0), (0.75, 10.0)]),
            rotate(1, &[(0.25, 0.0), (1.5, 10.0)]),
        ],
    );
    assert_approx(animation.duration, 1.5);
    assert_eq!(Animation::new("empty", Vec::new()).duration, 0.0);
}

#[test]
fn lookups_by_name() {
    let data = two_bone_builder()
        .slot(SlotData::new("body", 1))
        .animation(Animation::new("spin", vec![rotate(1, &[(0.0, 0.0)])]))
        .build()
        .unwrap();

    assert_eq!(data.find_bone("child"), Some(1));
    assert_eq!(data.find_bone("nope"), None);
    assert_eq!(data.find_slot("body"), Some(0));
    assert_eq!(data.find_animation("spin").unwrap().name, "spin");

    let err = data.find_animation("jump").unwrap_err();
    assert!(matches!(err, Error::NotFound { kind: "animation", ref name } if name == "jump"));
    assert_eq!(err.to_string(), "animation not found: jump");
}

#[test]
fn bones_must_follow_their_parent() {
    let result = SkeletonDataBuilder::new()
        .bone(BoneData::new("root", None))
        .bone(BoneData::new("arm", Some(2)))
        .bone(BoneData::new("hand", Some(0)))
        .build();
    assert!(invalid_data(result).contains("'arm'"));

    let result = SkeletonDataBuilder::new()
        .bone(BoneData::new("root", None))
        .bone(BoneData::new("root", Some(0)))
        .build();
    assert!(invalid_data(result).contains("duplicate bone"));
}

#[test]
fn two_bone_ik_needs_parent_and_child() {
    let result = SkeletonDataBuilder::new()
        .bone(BoneData::new("root", None))
        .bone(BoneData::new("upper", Some(0)))
        .bone(BoneData::new("other", Some(0)))
        .ik_constraint(IkConstraintData::new("leg", vec![1, 2], 0))
        .build();
    assert!(invalid_data(result).contains("direct child"));

    let result = two_bone_builder()
        .ik_constraint(IkConstraintData::new("leg", vec![0, 1, 1], 0))
        .build();
    assert!(invalid_data(result).contains("one or two bones"));
}

#[test]
fn deform_keys_match_attachment_vertices() {
    let mut skin = SkinData::new("default");
    skin.set_attachment(0, "mesh", mesh(3, None, false));
    let deform = |len: usize| {
        Timeline::Deform(DeformTimeline {
            slot_index: 0,
            skin: "default".to_string(),
            attachment: "mesh".to_string(),
            frames: vec![DeformFrame {
                time: 0.0,
                vertices: vec![0.0; len],
                curve: Curve::Linear,
            }],
        })
    };
    let builder = two_bone_builder()
        .slot(SlotData::new("body", 0))
        .skin(skin);

    assert!(
        builder
            .clone()
            .animation(Animation::new("ok", vec![deform(6)]))
            .build()
            .is_ok()
    );
    let result = builder
        .animation(Animation::new("bad", vec![deform(4)]))
        .build();
    assert!(invalid_data(result).contains("6 vertex values"));
}

#[test]
fn draw_order_keys_are_permutations() {
    let order = |draw_order: Vec<usize>| {
        Timeline::DrawOrder(DrawOrderTimeline {
            frames: vec![DrawOrderFrame {
                time: 0.0,
                draw_order: Some(draw_order),
            }],
        })
    };
    let builder = two_bone_builder()
        .slot(SlotData::new("a", 0))
        .slot(SlotData::new("b", 1));

    assert!(
        builder
            .clone()
            .animation(Animation::new("swap", vec![order(vec![1, 0])]))
            .build()
            .is_ok()
    );
    for bad in [vec![0, 0], vec![0], vec![0, 2]] {
        let result = builder
            .clone()
            .animation(Animation::new("bad", vec![order(bad)]))
            .build();
        assert!(invalid_data(result).contains("permutations"));
    }
}

#[test]
fn keyframes_must_ascend() {
    let result = two_bone_builder()
        .animation(Animation::new(
            "back",
            vec![rotate(0, &[(0.5, 0.0), (0.5, 10.0)])],
        ))
        .build();
    assert!(invalid_data(result).contains("strictly ascending"));

    let result = two_bone_builder()
        .animation(Animation::new("ghost", vec![rotate(7, &[(0.0, 0.0)])]))
        .build();
    assert!(invalid_data(result).contains("missing bone 7"));
}

#[test]
fn linked_meshes_share_deform_source() {
    let mut skin = SkinData::new("default");
    skin.set_attachment(0, "base", mesh(2, None, false));
    skin.set_attachment(0, "linked", mesh(2, Some("base"), true));
    skin.set_attachment(0, "own", mesh(2, Some("base"), false));
    skin.set_attachment(0, "plain", region(4.0, 4.0));
    let data = two_bone_builder()
        .slot(SlotData::new("body", 0))
        .skin(skin)
        .build()
        .unwrap();

    let skin = data.default_skin().unwrap();
    let base = skin.attachment(0, "base").unwrap();
    let linked = skin.attachment(0, "linked").unwrap();
    let own = skin.attachment(0, "own").unwrap();
    assert_ne!(base.vertex_id(), own.vertex_id());
    assert_eq!(linked.deform_source_id(), base.vertex_id());
    assert_eq!(own.deform_source_id(), own.vertex_id());
    assert_eq!(skin.attachment(0, "plain").unwrap().vertex_id(), None);

    let mut broken = SkinData::new("default");
    broken.set_attachment(0, "linked", mesh(2, Some("missing"), true));
    let result = two_bone_builder()
        .slot(SlotData::new("body", 0))
        .skin(broken)
        .build();
    assert!(invalid_data(result).contains("missing parent mesh"));
}

#[test]
fn property_ids_match_on_the_keyed_property() {
    let mut skin = SkinData::new("default");
    skin.set_attachment(0, "left", mesh(2, None, false));
    skin.set_attachment(0, "right", mesh(2, None, false));
    let data = two_bone_builder()
        .slot(SlotData::new("body", 0))
        .skin(skin)
        .build()
        .unwrap();
    let deform = |attachment: &str| {
        Timeline::Deform(DeformTimeline {
            slot_index: 0,
            skin: "default".to_string(),
            attachment: attachment.to_string(),
            frames: vec![DeformFrame {
                time: 0.0,
                vertices: vec![0.0; 4],
                curve: Curve::Linear,
            }],
        })
    };
    let id = |timeline: Timeline| timeline.property_id(&data);

    let swing = id(rotate(1, &[(0.0, 0.0), (1.0, 90.0)]));
    assert_eq!(swing, id(rotate(1, &[(0.5, -30.0)])));
    assert_ne!(swing, id(rotate(0, &[(0.0, 0.0)])));
    assert_ne!(swing, id(translate(1, &[(0.0, 0.0, 0.0)])));
    assert_ne!(
        id(translate(0, &[(0.0, 1.0, 1.0)])),
        id(Timeline::Scale(ScaleTimeline {
            bone_index: 0,
            frames: vec2_frames(&[(0.0, 1.0, 1.0)]),
        }))
    );
    assert_eq!(id(deform("left")), id(deform("left")));
    assert_ne!(id(deform("left")), id(deform("right")));
}

#[test]
fn foreign_animations_are_checked_against_the_data() {
    let data = two_bone_builder().build().unwrap();

    assert!(
        data.check_animation(&Animation::new("swing", vec![rotate(1, &[(0.0, 45.0)])]))
            .is_ok()
    );
    assert!(matches!(
        data.check_animation(&Animation::new("ghost", vec![rotate(5, &[(0.0, 45.0)])])),
        Err(Error::InvalidArgument { message }) if message.contains("missing bone 5")
    ));
    assert!(matches!(
        data.check_animation(&Animation::new("hollow", vec![rotate(0, &[])])),
        Err(Error::InvalidArgument { message }) if message.contains("no keyframes")
    ));
    assert!(matches!(
        data.check_animation(&Animation::new("nan", vec![rotate(0, &[(f32::NAN, 0.0)])])),
        Err(Error::InvalidArgument { .. })
    ));
}
