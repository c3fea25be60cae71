use crate::test_support::{assert_approx, region, two_bone_builder};
use crate::{
    Animation, AttachmentData, Curve, DeformFrame, DeformTimeline, MeshAttachmentData,
    MeshVertices, MixDirection, MixPose, PointAttachmentData, Skeleton, SkinData, SlotData,
    Timeline, VertexWeight,
};

fn assert_vertices(actual: &[f32], expected: &[f32]) {
    assert_eq!(actual.len(), expected.len(), "{actual:?}");
    for (a, e) in actual.iter().zip(expected) {
        assert_approx(*a, *e);
    }
}

fn mesh(
    vertices: MeshVertices,
    parent_mesh: Option<&str>,
    inherit_deform: bool,
) -> AttachmentData {
    AttachmentData::Mesh(MeshAttachmentData {
        vertex_id: 0,
        vertices,
        color: [1.0; 4],
        parent_mesh: parent_mesh.map(str::to_string),
        inherit_deform,
        deform_source_id: 0,
    })
}

fn skeleton_with(slot_bone: usize, attachments: Vec<(&str, AttachmentData)>) -> Skeleton {
    skeleton_with_animations(slot_bone, attachments, Vec::new())
}

fn skeleton_with_animations(
    slot_bone: usize,
    attachments: Vec<(&str, AttachmentData)>,
    animations: Vec<Animation>,
) -> Skeleton {
    let mut skin = SkinData::new("default");
    for (name, attachment) in attachments {
        skin.set_attachment(0, name, attachment);
    }
    let mut builder = two_bone_builder()
        .slot(SlotData::new("body", slot_bone))
        .skin(skin);
    for animation in animations {
        builder = builder.animation(animation);
    }
    Skeleton::new(builder.build().unwrap())
}

#[test]
fn region_corners_follow_the_bone() {
    let mut skeleton = skeleton_with(1, vec![("plate", region(10.0, 4.0))]);
    skeleton.set_attachment("body", Some("plate")).unwrap();
    skeleton.bones[0].rotation = 90.0;
    skeleton.update_world_transform();

    let vertices = skeleton.slot_world_vertices(0).unwrap();
    assert_vertices(&vertices, &[2.0, 10.0, 2.0, 0.0, -2.0, 0.0, -2.0, 10.0]);
}

#[test]
fn point_attachment_position_and_rotation() {
    let point = PointAttachmentData {
        x: 2.0,
        y: 0.0,
        rotation: 30.0,
    };
    let mut skeleton = skeleton_with(1, vec![("muzzle", AttachmentData::Point(point.clone()))]);
    skeleton.bones[0].rotation = 90.0;
    skeleton.update_world_transform();

    let bone = &skeleton.bones[1];
    let [x, y] = point.compute_world_position(bone);
    assert_approx(x, 0.0);
    assert_approx(y, 7.0);
    assert_approx(point.compute_world_rotation(bone), 120.0);

    skeleton.set_attachment("body", Some("muzzle")).unwrap();
    assert!(skeleton.slot_world_vertices(0).is_none());
    assert!(skeleton.bounds().is_none());
}

#[test]
fn unweighted_mesh_uses_deform_positions() {
    let vertices = MeshVertices::Unweighted(vec![[1.0, 0.0], [0.0, 1.0]]);
    let mut skeleton = skeleton_with(1, vec![("skin", mesh(vertices, None, false))]);
    skeleton.set_attachment("body", Some("skin")).unwrap();
    skeleton.update_world_transform();

    let world = skeleton.slot_world_vertices(0).unwrap();
    assert_vertices(&world, &[6.0, 0.0, 5.0, 1.0]);

    skeleton.slots[0].deform = vec![2.0, 0.0, 0.0, 2.0];
    let world = skeleton.slot_world_vertices(0).unwrap();
    assert_vertices(&world, &[7.0, 0.0, 5.0, 2.0]);
}

#[test]
fn weighted_mesh_blends_bone_influences() {
    let weights = vec![
        vec![
            VertexWeight {
                bone: 0,
                x: 0.0,
                y: 0.0,
                weight: 0.5,
            },
            VertexWeight {
                bone: 1,
                x: 0.0,
                y: 2.0,
                weight: 0.5,
            },
        ],
        vec![VertexWeight {
            bone: 1,
            x: 1.0,
            y: 0.0,
            weight: 1.0,
        }],
    ];
    let vertices = MeshVertices::Weighted(weights);
    assert_eq!(vertices.deform_length(), 6);
    let mut skeleton = skeleton_with(0, vec![("skin", mesh(vertices, None, false))]);
    skeleton.set_attachment("body", Some("skin")).unwrap();
    skeleton.update_world_transform();

    let world = skeleton.slot_world_vertices(0).unwrap();
    assert_vertices(&world, &[2.5, 1.0, 6.0, 0.0]);

    // Offsets apply per influence.
    skeleton.slots[0].deform = vec![2.0, 0.0, 0.0, 0.0, 0.0, 3.0];
    let world = skeleton.slot_world_vertices(0).unwrap();
    assert_vertices(&world, &[3.5, 1.0, 6.0, 3.0]);
}

fn squash() -> Animation {
    Animation::new(
        "squash",
        vec![Timeline::Deform(DeformTimeline {
            slot_index: 0,
            skin: "default".to_string(),
            attachment: "base".to_string(),
            frames: vec![
                DeformFrame {
                    time: 0.0,
                    vertices: vec![0.0, 0.0, 1.0, 1.0],
                    curve: Curve::Linear,
                },
                DeformFrame {
                    time: 1.0,
                    vertices: vec![2.0, 0.0, 3.0, 1.0],
                    curve: Curve::Linear,
                },
            ],
        })],
    )
}

#[test]
fn linked_meshes_inherit_deform_when_asked() {
    let positions = || MeshVertices::Unweighted(vec![[0.0, 0.0], [1.0, 1.0]]);
    let mut skeleton = skeleton_with_animations(
        0,
        vec![
            ("base", mesh(positions(), None, false)),
            ("linked", mesh(positions(), Some("base"), true)),
            ("own", mesh(positions(), Some("base"), false)),
        ],
        vec![squash()],
    );
    let animation = skeleton.data.find_animation("squash").unwrap().clone();
    let apply = |skeleton: &mut Skeleton| {
        animation.apply(
            skeleton,
            -1.0,
            0.5,
            false,
            None,
            1.0,
            MixPose::Setup,
            MixDirection::In,
        )
        .unwrap();
    };

    for name in ["base", "linked"] {
        skeleton.set_attachment("body", Some(name)).unwrap();
        apply(&mut skeleton);
        assert_vertices(&skeleton.slots[0].deform, &[1.0, 0.0, 2.0, 1.0]);
    }

    skeleton.set_attachment("body", Some("own")).unwrap();
    assert!(skeleton.slots[0].deform.is_empty());
    apply(&mut skeleton);
    assert!(skeleton.slots[0].deform.is_empty());
}
