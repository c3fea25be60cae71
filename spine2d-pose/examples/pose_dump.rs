use spine2d_pose::{
    Animation, AnimationState, AnimationStateData, BoneData, Curve, IkConstraintData,
    RotateFrame, RotateTimeline, Skeleton, SkeletonData, SkeletonDataBuilder, SlotData, Timeline,
    TranslateTimeline, Vec2Frame,
};
use std::sync::Arc;

fn usage() -> ! {
    eprintln!("Usage: pose_dump [<animation: wave|bob>] [<time seconds>] [--mix-from <animation>]");
    std::process::exit(2);
}

fn rotate(bone_index: usize, keys: &[(f32, f32)]) -> Timeline {
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

fn translate(bone_index: usize, keys: &[(f32, f32, f32)]) -> Timeline {
    Timeline::Translate(TranslateTimeline {
        bone_index,
        frames: keys
            .iter()
            .map(|&(time, x, y)| Vec2Frame {
                time,
                x,
                y,
                curve: Curve::bezier(0.25, 0.0, 0.75, 1.0),
            })
            .collect(),
    })
}

fn arm(name: &str, parent: usize, x: f32, length: f32) -> BoneData {
    let mut bone = BoneData::new(name, Some(parent));
    bone.x = x;
    bone.length = length;
    bone
}

/// A root, a two-bone arm reaching for a hand target, and a torso slot.
fn build_data() -> Result<Arc<SkeletonData>, spine2d_pose::Error> {
    let mut hand = BoneData::new("hand", Some(0));
    hand.x = 30.0;
    hand.y = 20.0;
    let mut ik = IkConstraintData::new("reach", vec![2, 3], 4);
    ik.mix = 0.0;

    SkeletonDataBuilder::new()
        .bone(BoneData::new("root", None))
        .bone(arm("torso", 0, 0.0, 40.0))
        .bone(arm("upper", 1, 40.0, 20.0))
        .bone(arm("lower", 2, 20.0, 20.0))
        .bone(hand)
        .slot(SlotData::new("torso", 1))
        .slot(SlotData::new("arm", 2))
        .ik_constraint(ik)
        .animation(Animation::new(
            "wave",
            vec![
                rotate(2, &[(0.0, 0.0), (0.5, 60.0), (1.0, 0.0)]),
                rotate(3, &[(0.0, 0.0), (0.5, -30.0), (1.0, 0.0)]),
            ],
        ))
        .animation(Animation::new(
            "bob",
            vec![translate(1, &[(0.0, 0.0, 0.0), (0.5, 0.0, 4.0), (1.0, 0.0, 0.0)])],
        ))
        .build()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut animation = "wave".to_string();
    let mut time = 0.25f32;
    let mut mix_from: Option<String> = None;

    let mut args = std::env::args().skip(1);
    let mut positional = 0;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--mix-from" => mix_from = Some(args.next().unwrap_or_else(|| usage())),
            "-h" | "--help" => usage(),
            _ if positional == 0 => {
                animation = arg;
                positional += 1;
            }
            _ if positional == 1 => {
                time = arg.parse().unwrap_or_else(|_| usage());
                positional += 1;
            }
            _ => usage(),
        }
    }

    let data = build_data()?;
    let mut skeleton = Skeleton::new(Arc::clone(&data));
    let mut state_data = AnimationStateData::new(data);
    state_data.default_mix = 0.2;
    let mut state = AnimationState::new(state_data);

    if let Some(from) = mix_from {
        state.set_animation_by_name(0, &from, true)?;
        state.update(0.0);
        state.apply(&mut skeleton);
    }
    state.set_animation_by_name(0, &animation, true)?;
    state.update(time.max(0.0));

    skeleton.set_to_setup_pose();
    state.apply(&mut skeleton);
    skeleton.update_world_transform();

    println!("{}", serde_json::to_string_pretty(&skeleton.pose())?);
    Ok(())
}
