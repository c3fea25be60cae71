use crate::test_support::{assert_approx, region, two_bone_builder};
use crate::{
    BoneData, Error, IkConstraintData, Skeleton, SkeletonDataBuilder, SkinData, SlotData,
    TransformConstraintData, TransformMode, UpdateCacheItem,
};

fn two_bones() -> Skeleton {
    Skeleton::new(two_bone_builder().build().unwrap())
}

fn scaled_parent_with_child(mode: TransformMode) -> Skeleton {
    let mut parent = BoneData::new("parent", Some(0));
    parent.rotation = 90.0;
    parent.scale_x = 2.0;
    parent.scale_y = 2.0;
    let mut child = BoneData::new("child", Some(1));
    child.x = 5.0;
    child.transform_mode = mode;
    let data = SkeletonDataBuilder::new()
        .bone(BoneData::new("root", None))
        .bone(parent)
        .bone(child)
        .build()
        .unwrap();
    let mut skeleton = Skeleton::new(data);
    skeleton.update_world_transform();
    skeleton
}

#[test]
fn world_transform_follows_parent_chain() {
    let mut skeleton = two_bones();
    skeleton.bones[0].rotation = 90.0;
    skeleton.update_world_transform();

    let child = &skeleton.bones[1];
    assert_approx(child.world_x, 0.0);
    assert_approx(child.world_y, 5.0);
    assert_approx(child.world_rotation_x(), 90.0);
    assert_approx(child.world_scale_x(), 1.0);

    let [x, y] = child.local_to_world(10.0, 0.0);
    assert_approx(x, 0.0);
    assert_approx(y, 15.0);
    let [lx, ly] = child.world_to_local(x, y);
    assert_approx(lx, 10.0);
    assert_approx(ly, 0.0);
}

#[test]
fn skeleton_position_and_flip_apply_to_roots() {
    let mut skeleton = two_bones();
    skeleton.x = 10.0;
    skeleton.y = -3.0;
    skeleton.flip_x = true;
    skeleton.update_world_transform();

    assert_approx(skeleton.bones[0].world_x, 10.0);
    assert_approx(skeleton.bones[0].world_y, -3.0);
    assert_approx(skeleton.bones[1].world_x, 5.0);
    assert_approx(skeleton.bones[1].a, -1.0);
}

#[test]
fn transform_modes_limit_inheritance() {
    let normal = scaled_parent_with_child(TransformMode::Normal);
    let child = &normal.bones[2];
    assert_approx(child.world_x, 0.0);
    assert_approx(child.world_y, 10.0);
    assert_approx(child.world_rotation_x(), 90.0);
    assert_approx(child.world_scale_x(), 2.0);

    let only_translation = scaled_parent_with_child(TransformMode::OnlyTranslation);
    let child = &only_translation.bones[2];
    assert_approx(child.world_y, 10.0);
    assert_approx(child.world_rotation_x(), 0.0);
    assert_approx(child.world_scale_x(), 1.0);

    let no_scale = scaled_parent_with_child(TransformMode::NoScale);
    let child = &no_scale.bones[2];
    assert_approx(child.world_rotation_x(), 90.0);
    assert_approx(child.world_scale_x(), 1.0);
    assert_approx(child.world_scale_y(), 1.0);

    let no_rotation = scaled_parent_with_child(TransformMode::NoRotationOrReflection);
    let child = &no_rotation.bones[2];
    assert_approx(child.world_rotation_x(), 0.0);
    assert_approx(child.world_scale_x(), 2.0);
}

#[test]
fn ik_bones_are_ordered_after_their_target() {
    let data = SkeletonDataBuilder::new()
        .bone(BoneData::new("root", None))
        .bone(BoneData::new("upper", Some(0)))
        .bone(BoneData::new("lower", Some(1)))
        .bone(BoneData::new("target", Some(0)))
        .bone(BoneData::new("hand", Some(2)))
        .ik_constraint(IkConstraintData::new("leg", vec![1, 2], 3))
        .build()
        .unwrap();
    let skeleton = Skeleton::new(data);

    assert_eq!(
        skeleton.update_cache_items(),
        &[
            UpdateCacheItem::Bone(0),
            UpdateCacheItem::Bone(3),
            UpdateCacheItem::Bone(1),
            UpdateCacheItem::Ik(0),
            UpdateCacheItem::Bone(4),
        ]
    );
    assert_eq!(skeleton.update_cache_reset(), &[2]);
}

#[test]
fn constraint_order_decides_update_order() {
    let mut ik = IkConstraintData::new("aim", vec![1], 2);
    ik.order = 1;
    let transform = TransformConstraintData::new("copy", vec![2], 0);
    let data = two_bone_builder()
        .bone(BoneData::new("target", Some(0)))
        .ik_constraint(ik)
        .transform_constraint(transform)
        .build()
        .unwrap();
    let skeleton = Skeleton::new(data);

    let items = skeleton.update_cache_items();
    let position = |item: UpdateCacheItem| items.iter().position(|i| *i == item).unwrap();
    assert!(position(UpdateCacheItem::Transform(0)) < position(UpdateCacheItem::Ik(0)));
    assert!(position(UpdateCacheItem::Bone(2)) < position(UpdateCacheItem::Transform(0)));
}

#[test]
fn setup_pose_restores_bones_slots_and_constraints() {
    let data = two_bone_builder()
        .bone(BoneData::new("target", Some(0)))
        .slot(SlotData::new("a", 0))
        .slot(SlotData::new("b", 1))
        .ik_constraint(IkConstraintData::new("aim", vec![1], 2))
        .build()
        .unwrap();
    let mut skeleton = Skeleton::new(data);

    skeleton.bones[1].rotation = 45.0;
    skeleton.bones[1].scale_x = 3.0;
    skeleton.slots[0].color = [0.0, 0.0, 0.0, 0.5];
    skeleton.draw_order = vec![1, 0];
    skeleton.ik_constraints[0].mix = 0.25;
    skeleton.ik_constraints[0].bend_direction = -1;

    skeleton.set_to_setup_pose();
    assert_eq!(skeleton.bones[1].rotation, 0.0);
    assert_eq!(skeleton.bones[1].scale_x, 1.0);
    assert_eq!(skeleton.bones[1].x, 5.0);
    assert_eq!(skeleton.slots[0].color, [1.0; 4]);
    assert_eq!(skeleton.draw_order, vec![0, 1]);
    assert_eq!(skeleton.ik_constraints[0].mix, 1.0);
    assert_eq!(skeleton.ik_constraints[0].bend_direction, 1);
}

#[test]
fn names_resolve_to_indices() {
    let data = two_bone_builder()
        .slot(SlotData::new("body", 1))
        .ik_constraint(IkConstraintData::new("aim", vec![1], 0))
        .build()
        .unwrap();
    let skeleton = Skeleton::new(data);

    assert_eq!(skeleton.bone_index("child").unwrap(), 1);
    assert_eq!(skeleton.slot_index("body").unwrap(), 0);
    assert_eq!(skeleton.ik_constraint_index("aim").unwrap(), 0);
    assert!(matches!(
        skeleton.bone_index("tail"),
        Err(Error::NotFound { kind: "bone", .. })
    ));
    assert!(matches!(
        skeleton.slot_index("head"),
        Err(Error::NotFound { kind: "slot", .. })
    ));
    assert!(matches!(
        skeleton.path_constraint_index("rail"),
        Err(Error::NotFound { kind: "path constraint", .. })
    ));
}

fn skinned() -> Skeleton {
    let mut default = SkinData::new("default");
    default.set_attachment(0, "head", region(10.0, 10.0));
    default.set_attachment(0, "hat", region(4.0, 4.0));
    let mut armor = SkinData::new("armor");
    armor.set_attachment(0, "head", region(20.0, 20.0));
    let mut body = SlotData::new("body", 1);
    body.attachment = Some("head".to_string());
    let data = two_bone_builder()
        .slot(body)
        .skin(default)
        .skin(armor)
        .build()
        .unwrap();
    Skeleton::new(data)
}

fn region_width(skeleton: &Skeleton) -> Option<f32> {
    match skeleton.slot_attachment_data(0)? {
        crate::AttachmentData::Region(region) => Some(region.width),
        _ => None,
    }
}

#[test]
fn skins_swap_attachments_by_name() {
    let mut skeleton = skinned();
    assert_eq!(region_width(&skeleton), Some(10.0));

    skeleton.set_skin(Some("armor")).unwrap();
    assert_eq!(skeleton.slots[0].attachment.as_deref(), Some("head"));
    assert_eq!(region_width(&skeleton), Some(20.0));

    // Falls back to the default skin for names the active skin lacks.
    skeleton.set_attachment("body", Some("hat")).unwrap();
    assert_eq!(region_width(&skeleton), Some(4.0));

    assert!(matches!(
        skeleton.set_skin(Some("missing")),
        Err(Error::NotFound { kind: "skin", .. })
    ));
    assert!(matches!(
        skeleton.set_attachment("body", Some("cape")),
        Err(Error::NotFound { kind: "attachment", .. })
    ));
    assert_eq!(skeleton.skin.as_deref(), Some("armor"));

    skeleton.set_attachment("body", None).unwrap();
    assert_eq!(skeleton.slots[0].attachment, None);
    assert_eq!(region_width(&skeleton), None);
}

#[test]
fn attachment_time_tracks_changes() {
    let mut skeleton = skinned();
    skeleton.update(2.0);
    assert_approx(skeleton.slot_attachment_time(0), 2.0);

    skeleton.set_attachment("body", Some("hat")).unwrap();
    assert_approx(skeleton.slot_attachment_time(0), 0.0);
    skeleton.update(0.5);
    assert_approx(skeleton.slot_attachment_time(0), 0.5);

    // Re-setting the same attachment keeps its time.
    skeleton.set_attachment("body", Some("hat")).unwrap();
    assert_approx(skeleton.slot_attachment_time(0), 0.5);
}

#[test]
fn applied_transform_is_recovered_from_world() {
    let mut skeleton = two_bones();
    skeleton.bones[1].scale_x = 2.0;
    skeleton.update_world_transform();
    assert!(skeleton.bones[1].is_applied_valid());

    skeleton.bones[1].rotate_world(30.0);
    assert!(!skeleton.bones[1].is_applied_valid());
    skeleton.update_applied_transform(1);

    let applied = skeleton.bones[1].applied();
    assert!(skeleton.bones[1].is_applied_valid());
    assert_approx(applied.x, 5.0);
    assert_approx(applied.rotation, 30.0);
    assert_approx(applied.scale_x, 2.0);
    assert_approx(applied.scale_y, 1.0);
    assert_approx(applied.shear_y, 0.0);
}

#[test]
fn rotations_convert_between_spaces() {
    let mut skeleton = two_bones();
    skeleton.bones[0].rotation = 30.0;
    skeleton.bones[1].rotation = 15.0;
    skeleton.update_world_transform();

    let child = &skeleton.bones[1];
    assert_approx(child.world_rotation_x(), 45.0);
    assert_approx(child.local_to_world_rotation(15.0), 45.0);
    assert_approx(child.world_to_local_rotation(45.0), 15.0);
}

#[test]
fn pose_lists_slots_in_draw_order() {
    let mut skeleton = skinned();
    skeleton.update_world_transform();
    let pose = skeleton.pose();

    assert_eq!(pose.bones.len(), 2);
    assert_eq!(pose.bones[1].name, "child");
    assert_eq!(pose.bones[1].world[4], 5.0);
    assert_eq!(pose.slots[0].name, "body");
    assert_eq!(pose.slots[0].bone, "child");
    assert_eq!(pose.slots[0].attachment.as_deref(), Some("head"));

    let bounds = skeleton.bounds().unwrap();
    assert_approx(bounds[0], 0.0);
    assert_approx(bounds[1], -5.0);
    assert_approx(bounds[2], 10.0);
    assert_approx(bounds[3], 5.0);
}
