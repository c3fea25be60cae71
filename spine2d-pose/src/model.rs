use crate::Error;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Name of the skin whose attachments are used when the active skin has no entry.
pub const DEFAULT_SKIN_NAME: &str = "default";

#[derive(Clone, Debug)]
pub struct BoneData {
    pub name: String,
    pub parent: Option<usize>,
    pub length: f32,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub shear_x: f32,
    pub shear_y: f32,
    pub transform_mode: TransformMode,
}

impl BoneData {
    pub fn new(name: impl Into<String>, parent: Option<usize>) -> Self {
        Self {
            name: name.into(),
            parent,
            length: 0.0,
            x: 0.0,
            y: 0.0,
            rotation: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            shear_x: 0.0,
            shear_y: 0.0,
            transform_mode: TransformMode::Normal,
        }
    }
}

/// How a bone inherits its parent's world transform.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum TransformMode {
    #[default]
    Normal,
    OnlyTranslation,
    NoRotationOrReflection,
    NoScale,
    NoScaleOrReflection,
}

#[derive(Clone, Debug)]
pub struct SlotData {
    pub name: String,
    pub bone: usize,
    pub attachment: Option<String>,
    pub color: [f32; 4],
    pub dark_color: Option<[f32; 3]>,
}

impl SlotData {
    pub fn new(name: impl Into<String>, bone: usize) -> Self {
        Self {
            name: name.into(),
            bone,
            attachment: None,
            color: [1.0, 1.0, 1.0, 1.0],
            dark_color: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct IkConstraintData {
    pub name: String,
    pub order: i32,
    pub bones: Vec<usize>,
    pub target: usize,
    pub mix: f32,
    /// `1` bends the chain counter-clockwise, `-1` clockwise.
    pub bend_direction: i32,
}

impl IkConstraintData {
    pub fn new(name: impl Into<String>, bones: Vec<usize>, target: usize) -> Self {
        Self {
            name: name.into(),
            order: 0,
            bones,
            target,
            mix: 1.0,
            bend_direction: 1,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TransformConstraintData {
    pub name: String,
    pub order: i32,
    pub bones: Vec<usize>,
    pub target: usize,
    pub rotate_mix: f32,
    pub translate_mix: f32,
    pub scale_mix: f32,
    pub shear_mix: f32,
    pub offset_rotation: f32,
    pub offset_x: f32,
    pub offset_y: f32,
    pub offset_scale_x: f32,
    pub offset_scale_y: f32,
    pub offset_shear_y: f32,
    pub relative: bool,
    pub local: bool,
}

impl TransformConstraintData {
    pub fn new(name: impl Into<String>, bones: Vec<usize>, target: usize) -> Self {
        Self {
            name: name.into(),
            order: 0,
            bones,
            target,
            rotate_mix: 1.0,
            translate_mix: 1.0,
            scale_mix: 1.0,
            shear_mix: 1.0,
            offset_rotation: 0.0,
            offset_x: 0.0,
            offset_y: 0.0,
            offset_scale_x: 0.0,
            offset_scale_y: 0.0,
            offset_shear_y: 0.0,
            relative: false,
            local: false,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum PositionMode {
    Fixed,
    #[default]
    Percent,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum SpacingMode {
    #[default]
    Length,
    Fixed,
    Percent,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum RotateMode {
    #[default]
    Tangent,
    Chain,
    ChainScale,
}

#[derive(Clone, Debug)]
pub struct PathConstraintData {
    pub name: String,
    pub order: i32,
    pub bones: Vec<usize>,
    /// Slot whose path attachment the bones follow.
    pub target: usize,
    pub position_mode: PositionMode,
    pub spacing_mode: SpacingMode,
    pub rotate_mode: RotateMode,
    pub offset_rotation: f32,
    pub position: f32,
    pub spacing: f32,
    pub rotate_mix: f32,
    pub translate_mix: f32,
}

impl PathConstraintData {
    pub fn new(name: impl Into<String>, bones: Vec<usize>, target: usize) -> Self {
        Self {
            name: name.into(),
            order: 0,
            bones,
            target,
            position_mode: PositionMode::Percent,
            spacing_mode: SpacingMode::Length,
            rotate_mode: RotateMode::Tangent,
            offset_rotation: 0.0,
            position: 0.0,
            spacing: 0.0,
            rotate_mix: 1.0,
            translate_mix: 1.0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct VertexWeight {
    pub bone: usize,
    pub x: f32,
    pub y: f32,
    pub weight: f32,
}

#[derive(Clone, Debug)]
pub enum MeshVertices {
    Unweighted(Vec<[f32; 2]>),
    Weighted(Vec<Vec<VertexWeight>>),
}

impl MeshVertices {
    pub fn vertex_count(&self) -> usize {
        match self {
            MeshVertices::Unweighted(v) => v.len(),
            MeshVertices::Weighted(v) => v.len(),
        }
    }

    /// Number of floats a deform array for these vertices holds: positions for unweighted
    /// vertices, one offset per bone influence for weighted ones.
    pub fn deform_length(&self) -> usize {
        match self {
            MeshVertices::Unweighted(v) => v.len() * 2,
            MeshVertices::Weighted(v) => v.iter().map(Vec::len).sum::<usize>() * 2,
        }
    }

    pub fn is_weighted(&self) -> bool {
        matches!(self, MeshVertices::Weighted(_))
    }

    /// Flattened setup positions of unweighted vertices; empty when weighted.
    pub fn setup_positions(&self) -> Vec<f32> {
        match self {
            MeshVertices::Unweighted(v) => v.iter().flat_map(|p| [p[0], p[1]]).collect(),
            MeshVertices::Weighted(_) => Vec::new(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RegionAttachmentData {
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub width: f32,
    pub height: f32,
    pub color: [f32; 4],
}

#[derive(Clone, Debug)]
pub struct MeshAttachmentData {
    /// Identity used to match deform timelines; assigned by [`SkeletonDataBuilder::build`].
    pub vertex_id: u32,
    pub vertices: MeshVertices,
    pub color: [f32; 4],
    /// Name of the mesh in the same skin and slot this mesh is linked to.
    pub parent_mesh: Option<String>,
    /// When linked, deform timelines keyed for the parent mesh also deform this one.
    pub inherit_deform: bool,
    /// Vertex id of the attachment whose deform timelines apply to this mesh; assigned by
    /// [`SkeletonDataBuilder::build`].
    pub deform_source_id: u32,
}

#[derive(Clone, Debug)]
pub struct BoundingBoxAttachmentData {
    pub vertex_id: u32,
    pub vertices: MeshVertices,
}

#[derive(Clone, Debug)]
pub struct ClippingAttachmentData {
    pub vertex_id: u32,
    pub vertices: MeshVertices,
    pub end_slot: Option<usize>,
}

#[derive(Clone, Debug)]
pub struct PathAttachmentData {
    pub vertex_id: u32,
    pub vertices: MeshVertices,
    /// Cumulative length at the end of each curve.
    pub lengths: Vec<f32>,
    pub closed: bool,
    pub constant_speed: bool,
}

#[derive(Clone, Debug)]
pub struct PointAttachmentData {
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
}

#[derive(Clone, Debug)]
pub enum AttachmentData {
    Region(RegionAttachmentData),
    Mesh(MeshAttachmentData),
    BoundingBox(BoundingBoxAttachmentData),
    Path(PathAttachmentData),
    Point(PointAttachmentData),
    Clipping(ClippingAttachmentData),
}

impl AttachmentData {
    pub fn vertices(&self) -> Option<&MeshVertices> {
        match self {
            AttachmentData::Mesh(m) => Some(&m.vertices),
            AttachmentData::BoundingBox(b) => Some(&b.vertices),
            AttachmentData::Path(p) => Some(&p.vertices),
            AttachmentData::Clipping(c) => Some(&c.vertices),
            AttachmentData::Region(_) | AttachmentData::Point(_) => None,
        }
    }

    pub fn vertex_id(&self) -> Option<u32> {
        match self {
            AttachmentData::Mesh(m) => Some(m.vertex_id),
            AttachmentData::BoundingBox(b) => Some(b.vertex_id),
            AttachmentData::Path(p) => Some(p.vertex_id),
            AttachmentData::Clipping(c) => Some(c.vertex_id),
            AttachmentData::Region(_) | AttachmentData::Point(_) => None,
        }
    }

    /// Vertex id deform timelines must target to deform this attachment.
    pub fn deform_source_id(&self) -> Option<u32> {
        match self {
            AttachmentData::Mesh(m) => Some(m.deform_source_id),
            other => other.vertex_id(),
        }
    }

    /// Length of the deform array a deform timeline must key for this attachment.
    pub fn deform_length(&self) -> usize {
        self.vertices().map_or(0, MeshVertices::deform_length)
    }

    fn set_vertex_id(&mut self, id: u32) {
        match self {
            AttachmentData::Mesh(m) => {
                m.vertex_id = id;
                m.deform_source_id = id;
            }
            AttachmentData::BoundingBox(b) => b.vertex_id = id,
            AttachmentData::Path(p) => p.vertex_id = id,
            AttachmentData::Clipping(c) => c.vertex_id = id,
            AttachmentData::Region(_) | AttachmentData::Point(_) => {}
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SkinData {
    pub name: String,
    /// Per slot index, attachments keyed by their name within the skin.
    pub attachments: Vec<HashMap<String, AttachmentData>>,
}

impl SkinData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attachments: Vec::new(),
        }
    }

    pub fn attachment(&self, slot_index: usize, attachment_name: &str) -> Option<&AttachmentData> {
        self.attachments
            .get(slot_index)
            .and_then(|slot_map| slot_map.get(attachment_name))
    }

    pub fn set_attachment(
        &mut self,
        slot_index: usize,
        attachment_name: impl Into<String>,
        attachment: AttachmentData,
    ) {
        if self.attachments.len() <= slot_index {
            self.attachments.resize_with(slot_index + 1, HashMap::new);
        }
        self.attachments[slot_index].insert(attachment_name.into(), attachment);
    }
}

#[derive(Clone, Debug)]
pub struct EventData {
    pub name: String,
    pub int_value: i32,
    pub float_value: f32,
    pub string: String,
}

impl EventData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            int_value: 0,
            float_value: 0.0,
            string: String::new(),
        }
    }

    /// An event instance keyed at `time` carrying this data's default values.
    pub fn event_at(&self, time: f32) -> Event {
        Event {
            time,
            name: self.name.clone(),
            int_value: self.int_value,
            float_value: self.float_value,
            string: self.string.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub time: f32,
    pub name: String,
    pub int_value: i32,
    pub float_value: f32,
    pub string: String,
}

/// Number of subdivisions the Bezier table is sampled at; the first and last points (0,0)
/// and (1,1) are implicit.
const BEZIER_SEGMENTS: usize = 10;
const BEZIER_SAMPLES: usize = BEZIER_SEGMENTS - 1;

/// Interpolation from a keyframe to the next one.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Curve {
    #[default]
    Linear,
    Stepped,
    Bezier(BezierCurve),
}

#[derive(Clone, Debug, PartialEq)]
pub struct BezierCurve {
    samples: [[f32; 2]; BEZIER_SAMPLES],
}

impl Curve {
    /// Builds a Bezier curve from its two control points. `cx1`/`cx2` are time percentages in
    /// `[0, 1]`, `cy1`/`cy2` value percentages.
    pub fn bezier(cx1: f32, cy1: f32, cx2: f32, cy2: f32) -> Self {
        let subdiv1 = 1.0 / BEZIER_SEGMENTS as f32;
        let subdiv2 = subdiv1 * subdiv1;
        let subdiv3 = subdiv2 * subdiv1;
        let pre1 = 3.0 * subdiv1;
        let pre2 = 3.0 * subdiv2;
        let pre4 = 6.0 * subdiv2;
        let pre5 = 6.0 * subdiv3;

        let tmp1x = -cx1 * 2.0 + cx2;
        let tmp1y = -cy1 * 2.0 + cy2;
        let tmp2x = (cx1 - cx2) * 3.0 + 1.0;
        let tmp2y = (cy1 - cy2) * 3.0 + 1.0;
        let mut dfx = cx1 * pre1 + tmp1x * pre2 + tmp2x * subdiv3;
        let mut dfy = cy1 * pre1 + tmp1y * pre2 + tmp2y * subdiv3;
        let mut ddfx = tmp1x * pre4 + tmp2x * pre5;
        let mut ddfy = tmp1y * pre4 + tmp2y * pre5;
        let dddfx = tmp2x * pre5;
        let dddfy = tmp2y * pre5;

        let mut samples = [[0.0; 2]; BEZIER_SAMPLES];
        let mut x = dfx;
        let mut y = dfy;
        for sample in &mut samples {
            *sample = [x, y];
            dfx += ddfx;
            dfy += ddfy;
            ddfx += dddfx;
            ddfy += dddfy;
            x += dfx;
            y += dfy;
        }
        Curve::Bezier(BezierCurve { samples })
    }

    /// Maps the elapsed time percentage between two keys to the value percentage.
    pub fn percent(&self, percent: f32) -> f32 {
        let percent = percent.clamp(0.0, 1.0);
        if percent >= 1.0 {
            return 1.0;
        }
        match self {
            Curve::Linear => percent,
            Curve::Stepped => 0.0,
            Curve::Bezier(curve) => curve.percent(percent),
        }
    }
}

impl BezierCurve {
    fn percent(&self, percent: f32) -> f32 {
        if percent <= 0.0 {
            return 0.0;
        }
        let samples = &self.samples;
        let i = samples.partition_point(|s| s[0] < percent);
        let (prev, next) = match i {
            0 => ([0.0, 0.0], samples[0]),
            i if i == samples.len() => (samples[i - 1], [1.0, 1.0]),
            i => (samples[i - 1], samples[i]),
        };
        let dx = next[0] - prev[0];
        if dx <= 0.0 {
            return next[1];
        }
        prev[1] + (next[1] - prev[1]) * (percent - prev[0]) / dx
    }
}

/// A keyframe stored in a strictly time-ascending array.
pub trait Keyframe {
    fn time(&self) -> f32;
}

macro_rules! impl_keyframe {
    ($($ty:ty),* $(,)?) => {
        $(impl Keyframe for $ty {
            fn time(&self) -> f32 {
                self.time
            }
        })*
    };
}

#[derive(Clone, Debug)]
pub struct RotateFrame {
    pub time: f32,
    /// Degrees added to the setup rotation.
    pub angle: f32,
    pub curve: Curve,
}

#[derive(Clone, Debug)]
pub struct RotateTimeline {
    pub bone_index: usize,
    pub frames: Vec<RotateFrame>,
}

#[derive(Clone, Debug)]
pub struct Vec2Frame {
    pub time: f32,
    pub x: f32,
    pub y: f32,
    pub curve: Curve,
}

/// Translation offsets added to the setup position.
#[derive(Clone, Debug)]
pub struct TranslateTimeline {
    pub bone_index: usize,
    pub frames: Vec<Vec2Frame>,
}

/// Scale factors multiplied with the setup scale.
#[derive(Clone, Debug)]
pub struct ScaleTimeline {
    pub bone_index: usize,
    pub frames: Vec<Vec2Frame>,
}

/// Shear offsets in degrees added to the setup shear.
#[derive(Clone, Debug)]
pub struct ShearTimeline {
    pub bone_index: usize,
    pub frames: Vec<Vec2Frame>,
}

#[derive(Clone, Debug)]
pub struct ColorFrame {
    pub time: f32,
    pub color: [f32; 4],
    pub curve: Curve,
}

#[derive(Clone, Debug)]
pub struct ColorTimeline {
    pub slot_index: usize,
    pub frames: Vec<ColorFrame>,
}

#[derive(Clone, Debug)]
pub struct TwoColorFrame {
    pub time: f32,
    pub light: [f32; 4],
    pub dark: [f32; 3],
    pub curve: Curve,
}

#[derive(Clone, Debug)]
pub struct TwoColorTimeline {
    pub slot_index: usize,
    pub frames: Vec<TwoColorFrame>,
}

#[derive(Clone, Debug)]
pub struct AttachmentFrame {
    pub time: f32,
    pub name: Option<String>,
}

#[derive(Clone, Debug)]
pub struct AttachmentTimeline {
    pub slot_index: usize,
    pub frames: Vec<AttachmentFrame>,
}

#[derive(Clone, Debug)]
pub struct DeformFrame {
    pub time: f32,
    /// Absolute positions for unweighted vertices, offsets for weighted ones.
    pub vertices: Vec<f32>,
    pub curve: Curve,
}

#[derive(Clone, Debug)]
pub struct DeformTimeline {
    pub slot_index: usize,
    pub skin: String,
    pub attachment: String,
    pub frames: Vec<DeformFrame>,
}

#[derive(Clone, Debug)]
pub struct EventTimeline {
    pub events: Vec<Event>,
}

#[derive(Clone, Debug)]
pub struct DrawOrderFrame {
    pub time: f32,
    /// For each draw order position, the setup index of the slot drawn there. `None` restores
    /// the setup order.
    pub draw_order: Option<Vec<usize>>,
}

#[derive(Clone, Debug)]
pub struct DrawOrderTimeline {
    pub frames: Vec<DrawOrderFrame>,
}

#[derive(Clone, Debug)]
pub struct IkFrame {
    pub time: f32,
    pub mix: f32,
    pub bend_direction: i32,
    pub curve: Curve,
}

#[derive(Clone, Debug)]
pub struct IkConstraintTimeline {
    pub constraint_index: usize,
    pub frames: Vec<IkFrame>,
}

#[derive(Clone, Debug)]
pub struct TransformFrame {
    pub time: f32,
    pub rotate_mix: f32,
    pub translate_mix: f32,
    pub scale_mix: f32,
    pub shear_mix: f32,
    pub curve: Curve,
}

#[derive(Clone, Debug)]
pub struct TransformConstraintTimeline {
    pub constraint_index: usize,
    pub frames: Vec<TransformFrame>,
}

#[derive(Clone, Debug)]
pub struct FloatFrame {
    pub time: f32,
    pub value: f32,
    pub curve: Curve,
}

#[derive(Clone, Debug)]
pub struct PathConstraintPositionTimeline {
    pub constraint_index: usize,
    pub frames: Vec<FloatFrame>,
}

#[derive(Clone, Debug)]
pub struct PathConstraintSpacingTimeline {
    pub constraint_index: usize,
    pub frames: Vec<FloatFrame>,
}

#[derive(Clone, Debug)]
pub struct PathMixFrame {
    pub time: f32,
    pub rotate_mix: f32,
    pub translate_mix: f32,
    pub curve: Curve,
}

#[derive(Clone, Debug)]
pub struct PathConstraintMixTimeline {
    pub constraint_index: usize,
    pub frames: Vec<PathMixFrame>,
}

impl_keyframe!(
    RotateFrame,
    Vec2Frame,
    ColorFrame,
    TwoColorFrame,
    AttachmentFrame,
    DeformFrame,
    Event,
    DrawOrderFrame,
    IkFrame,
    TransformFrame,
    FloatFrame,
    PathMixFrame,
);

#[derive(Clone, Debug)]
pub enum Timeline {
    Rotate(RotateTimeline),
    Translate(TranslateTimeline),
    Scale(ScaleTimeline),
    Shear(ShearTimeline),
    Color(ColorTimeline),
    TwoColor(TwoColorTimeline),
    Attachment(AttachmentTimeline),
    Deform(DeformTimeline),
    Event(EventTimeline),
    DrawOrder(DrawOrderTimeline),
    IkConstraint(IkConstraintTimeline),
    TransformConstraint(TransformConstraintTimeline),
    PathConstraintPosition(PathConstraintPositionTimeline),
    PathConstraintSpacing(PathConstraintSpacingTimeline),
    PathConstraintMix(PathConstraintMixTimeline),
}

const PROPERTY_ROTATE: u64 = 0;
const PROPERTY_TRANSLATE: u64 = 1;
const PROPERTY_SCALE: u64 = 2;
const PROPERTY_SHEAR: u64 = 3;
const PROPERTY_ATTACHMENT: u64 = 4;
const PROPERTY_COLOR: u64 = 5;
const PROPERTY_DEFORM: u64 = 6;
const PROPERTY_EVENT: u64 = 7;
const PROPERTY_DRAW_ORDER: u64 = 8;
const PROPERTY_IK_CONSTRAINT: u64 = 9;
const PROPERTY_TRANSFORM_CONSTRAINT: u64 = 10;
const PROPERTY_PATH_CONSTRAINT_POSITION: u64 = 11;
const PROPERTY_PATH_CONSTRAINT_SPACING: u64 = 12;
const PROPERTY_PATH_CONSTRAINT_MIX: u64 = 13;
const PROPERTY_TWO_COLOR: u64 = 14;

fn property_id(property: u64, data: u64) -> u64 {
    (property << 32) | data
}

impl Timeline {
    /// Keyframe times in ascending order.
    pub fn frame_times(&self) -> Vec<f32> {
        fn times<F: Keyframe>(frames: &[F]) -> Vec<f32> {
            frames.iter().map(Keyframe::time).collect()
        }
        match self {
            Timeline::Rotate(t) => times(&t.frames),
            Timeline::Translate(t) => times(&t.frames),
            Timeline::Scale(t) => times(&t.frames),
            Timeline::Shear(t) => times(&t.frames),
            Timeline::Color(t) => times(&t.frames),
            Timeline::TwoColor(t) => times(&t.frames),
            Timeline::Attachment(t) => times(&t.frames),
            Timeline::Deform(t) => times(&t.frames),
            Timeline::Event(t) => times(&t.events),
            Timeline::DrawOrder(t) => times(&t.frames),
            Timeline::IkConstraint(t) => times(&t.frames),
            Timeline::TransformConstraint(t) => times(&t.frames),
            Timeline::PathConstraintPosition(t) => times(&t.frames),
            Timeline::PathConstraintSpacing(t) => times(&t.frames),
            Timeline::PathConstraintMix(t) => times(&t.frames),
        }
    }

    /// Identifies the skeleton property this timeline keys. Two timelines with the same id
    /// write the same property, whatever their keys.
    pub fn property_id(&self, data: &SkeletonData) -> u64 {
        match self {
            Timeline::Rotate(t) => property_id(PROPERTY_ROTATE, t.bone_index as u64),
            Timeline::Translate(t) => property_id(PROPERTY_TRANSLATE, t.bone_index as u64),
            Timeline::Scale(t) => property_id(PROPERTY_SCALE, t.bone_index as u64),
            Timeline::Shear(t) => property_id(PROPERTY_SHEAR, t.bone_index as u64),
            Timeline::Attachment(t) => property_id(PROPERTY_ATTACHMENT, t.slot_index as u64),
            Timeline::Color(t) => property_id(PROPERTY_COLOR, t.slot_index as u64),
            Timeline::TwoColor(t) => property_id(PROPERTY_TWO_COLOR, t.slot_index as u64),
            Timeline::Deform(t) => {
                let vertex_id = data
                    .skin(&t.skin)
                    .and_then(|skin| skin.attachment(t.slot_index, &t.attachment))
                    .and_then(|attachment| attachment.vertex_id())
                    .map_or(0, u64::from);
                property_id(PROPERTY_DEFORM, vertex_id)
            }
            Timeline::Event(_) => property_id(PROPERTY_EVENT, 0),
            Timeline::DrawOrder(_) => property_id(PROPERTY_DRAW_ORDER, 0),
            Timeline::IkConstraint(t) => {
                property_id(PROPERTY_IK_CONSTRAINT, t.constraint_index as u64)
            }
            Timeline::TransformConstraint(t) => {
                property_id(PROPERTY_TRANSFORM_CONSTRAINT, t.constraint_index as u64)
            }
            Timeline::PathConstraintPosition(t) => {
                property_id(PROPERTY_PATH_CONSTRAINT_POSITION, t.constraint_index as u64)
            }
            Timeline::PathConstraintSpacing(t) => {
                property_id(PROPERTY_PATH_CONSTRAINT_SPACING, t.constraint_index as u64)
            }
            Timeline::PathConstraintMix(t) => {
                property_id(PROPERTY_PATH_CONSTRAINT_MIX, t.constraint_index as u64)
            }
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Timeline::Rotate(_) => "rotate",
            Timeline::Translate(_) => "translate",
            Timeline::Scale(_) => "scale",
            Timeline::Shear(_) => "shear",
            Timeline::Color(_) => "color",
            Timeline::TwoColor(_) => "two color",
            Timeline::Attachment(_) => "attachment",
            Timeline::Deform(_) => "deform",
            Timeline::Event(_) => "event",
            Timeline::DrawOrder(_) => "draw order",
            Timeline::IkConstraint(_) => "ik constraint",
            Timeline::TransformConstraint(_) => "transform constraint",
            Timeline::PathConstraintPosition(_) => "path constraint position",
            Timeline::PathConstraintSpacing(_) => "path constraint spacing",
            Timeline::PathConstraintMix(_) => "path constraint mix",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Animation {
    pub name: String,
    pub duration: f32,
    pub timelines: Vec<Timeline>,
}

impl Animation {
    /// Creates an animation whose duration is the time of its last keyframe.
    pub fn new(name: impl Into<String>, timelines: Vec<Timeline>) -> Self {
        let duration = timelines
            .iter()
            .filter_map(|t| t.frame_times().last().copied())
            .fold(0.0f32, f32::max);
        Self {
            name: name.into(),
            duration,
            timelines,
        }
    }
}

/// Immutable setup data shared by every skeleton instance created from it.
#[derive(Clone, Debug)]
pub struct SkeletonData {
    pub bones: Vec<BoneData>,
    pub slots: Vec<SlotData>,
    pub skins: HashMap<String, SkinData>,
    pub events: Vec<EventData>,
    pub animations: Vec<Arc<Animation>>,
    pub ik_constraints: Vec<IkConstraintData>,
    pub transform_constraints: Vec<TransformConstraintData>,
    pub path_constraints: Vec<PathConstraintData>,
    bone_index: HashMap<String, usize>,
    slot_index: HashMap<String, usize>,
    animation_index: HashMap<String, usize>,
}

impl SkeletonData {
    pub fn animation(&self, name: &str) -> Option<(usize, &Arc<Animation>)> {
        let index = *self.animation_index.get(name)?;
        Some((index, &self.animations[index]))
    }

    pub fn find_animation(&self, name: &str) -> Result<&Arc<Animation>, Error> {
        self.animation(name)
            .map(|(_, animation)| animation)
            .ok_or_else(|| Error::not_found("animation", name))
    }

    pub fn find_bone(&self, name: &str) -> Option<usize> {
        self.bone_index.get(name).copied()
    }

    pub fn find_slot(&self, name: &str) -> Option<usize> {
        self.slot_index.get(name).copied()
    }

    pub fn find_event(&self, name: &str) -> Option<&EventData> {
        self.events.iter().find(|e| e.name == name)
    }

    pub fn find_ik_constraint(&self, name: &str) -> Option<usize> {
        self.ik_constraints.iter().position(|c| c.name == name)
    }

    pub fn find_transform_constraint(&self, name: &str) -> Option<usize> {
        self.transform_constraints.iter().position(|c| c.name == name)
    }

    pub fn find_path_constraint(&self, name: &str) -> Option<usize> {
        self.path_constraints.iter().position(|c| c.name == name)
    }

    pub fn skin(&self, name: &str) -> Option<&SkinData> {
        self.skins.get(name)
    }

    pub fn default_skin(&self) -> Option<&SkinData> {
        self.skins.get(DEFAULT_SKIN_NAME)
    }

    /// Runs the builder's animation checks against this data: ascending finite keys and only
    /// bones, slots, attachments and constraints that exist here.
    pub fn check_animation(&self, animation: &Animation) -> Result<(), Error> {
        validate_animation(self, animation).map_err(|err| match err {
            Error::InvalidData { message } => Error::InvalidArgument { message },
            other => other,
        })
    }
}

/// Assembles and validates [`SkeletonData`]. Bones, slots and constraints are indexed in the
/// order they are added.
#[derive(Clone, Debug, Default)]
pub struct SkeletonDataBuilder {
    bones: Vec<BoneData>,
    slots: Vec<SlotData>,
    skins: Vec<SkinData>,
    events: Vec<EventData>,
    animations: Vec<Animation>,
    ik_constraints: Vec<IkConstraintData>,
    transform_constraints: Vec<TransformConstraintData>,
    path_constraints: Vec<PathConstraintData>,
}

impl SkeletonDataBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bone(mut self, bone: BoneData) -> Self {
        self.bones.push(bone);
        self
    }

    pub fn slot(mut self, slot: SlotData) -> Self {
        self.slots.push(slot);
        self
    }

    pub fn skin(mut self, skin: SkinData) -> Self {
        self.skins.push(skin);
        self
    }

    pub fn event(mut self, event: EventData) -> Self {
        self.events.push(event);
        self
    }

    pub fn animation(mut self, animation: Animation) -> Self {
        self.animations.push(animation);
        self
    }

    pub fn ik_constraint(mut self, constraint: IkConstraintData) -> Self {
        self.ik_constraints.push(constraint);
        self
    }

    pub fn transform_constraint(mut self, constraint: TransformConstraintData) -> Self {
        self.transform_constraints.push(constraint);
        self
    }

    pub fn path_constraint(mut self, constraint: PathConstraintData) -> Self {
        self.path_constraints.push(constraint);
        self
    }

    pub fn build(self) -> Result<Arc<SkeletonData>, Error> {
        let bone_count = self.bones.len();
        let slot_count = self.slots.len();

        let mut bone_index = HashMap::with_capacity(bone_count);
        for (i, bone) in self.bones.iter().enumerate() {
            if let Some(parent) = bone.parent {
                if parent >= i {
                    return Err(Error::invalid_data(format!(
                        "bone '{}' must come after its parent",
                        bone.name
                    )));
                }
            }
            if bone_index.insert(bone.name.clone(), i).is_some() {
                return Err(Error::invalid_data(format!(
                    "duplicate bone name '{}'",
                    bone.name
                )));
            }
        }

        let mut slot_index = HashMap::with_capacity(slot_count);
        for (i, slot) in self.slots.iter().enumerate() {
            if slot.bone >= bone_count {
                return Err(Error::invalid_data(format!(
                    "slot '{}' references missing bone {}",
                    slot.name, slot.bone
                )));
            }
            if slot_index.insert(slot.name.clone(), i).is_some() {
                return Err(Error::invalid_data(format!(
                    "duplicate slot name '{}'",
                    slot.name
                )));
            }
        }

        let check_bones = |kind: &str, name: &str, bones: &[usize]| -> Result<(), Error> {
            if bones.is_empty() {
                return Err(Error::invalid_data(format!(
                    "{kind} constraint '{name}' has no bones"
                )));
            }
            if let Some(b) = bones.iter().find(|&&b| b >= bone_count) {
                return Err(Error::invalid_data(format!(
                    "{kind} constraint '{name}' references missing bone {b}"
                )));
            }
            Ok(())
        };
        for c in &self.ik_constraints {
            check_bones("ik", &c.name, &c.bones)?;
            if c.bones.len() > 2 {
                return Err(Error::invalid_data(format!(
                    "ik constraint '{}' must constrain one or two bones",
                    c.name
                )));
            }
            if c.target >= bone_count {
                return Err(Error::invalid_data(format!(
                    "ik constraint '{}' references missing target bone {}",
                    c.name, c.target
                )));
            }
            if c.bones.len() == 2 && self.bones[c.bones[1]].parent != Some(c.bones[0]) {
                return Err(Error::invalid_data(format!(
                    "ik constraint '{}' child bone must be a direct child of the parent bone",
                    c.name
                )));
            }
        }
        for c in &self.transform_constraints {
            check_bones("transform", &c.name, &c.bones)?;
            if c.target >= bone_count {
                return Err(Error::invalid_data(format!(
                    "transform constraint '{}' references missing target bone {}",
                    c.name, c.target
                )));
            }
        }
        for c in &self.path_constraints {
            check_bones("path", &c.name, &c.bones)?;
            if c.target >= slot_count {
                return Err(Error::invalid_data(format!(
                    "path constraint '{}' references missing target slot {}",
                    c.name, c.target
                )));
            }
        }

        let mut skins = HashMap::with_capacity(self.skins.len());
        let mut next_vertex_id = 0u32;
        for mut skin in self.skins {
            if skin.attachments.len() > slot_count {
                return Err(Error::invalid_data(format!(
                    "skin '{}' has attachments for missing slots",
                    skin.name
                )));
            }
            skin.attachments.resize_with(slot_count, HashMap::new);
            for attachments in &mut skin.attachments {
                for attachment in attachments.values_mut() {
                    validate_attachment_bones(&skin.name, attachment, bone_count)?;
                    if attachment.vertex_id().is_some() {
                        next_vertex_id += 1;
                        attachment.set_vertex_id(next_vertex_id);
                    }
                }
                link_meshes(&skin.name, attachments)?;
            }
            if skins.contains_key(&skin.name) {
                return Err(Error::invalid_data(format!(
                    "duplicate skin name '{}'",
                    skin.name
                )));
            }
            skins.insert(skin.name.clone(), skin);
        }

        let mut data = SkeletonData {
            bones: self.bones,
            slots: self.slots,
            skins,
            events: self.events,
            animations: Vec::with_capacity(self.animations.len()),
            ik_constraints: self.ik_constraints,
            transform_constraints: self.transform_constraints,
            path_constraints: self.path_constraints,
            bone_index,
            slot_index,
            animation_index: HashMap::new(),
        };

        for animation in self.animations {
            validate_animation(&data, &animation)?;
            let index = data.animations.len();
            if data
                .animation_index
                .insert(animation.name.clone(), index)
                .is_some()
            {
                return Err(Error::invalid_data(format!(
                    "duplicate animation name '{}'",
                    animation.name
                )));
            }
            data.animations.push(Arc::new(animation));
        }

        log::debug!(
            "built skeleton data: {} bones, {} slots, {} animations",
            data.bones.len(),
            data.slots.len(),
            data.animations.len()
        );
        Ok(Arc::new(data))
    }
}

fn link_meshes(skin: &str, attachments: &mut HashMap<String, AttachmentData>) -> Result<(), Error> {
    let mut links = Vec::new();
    for (name, attachment) in attachments.iter() {
        let AttachmentData::Mesh(mesh) = attachment else {
            continue;
        };
        let Some(parent) = mesh.parent_mesh.as_deref() else {
            continue;
        };
        let parent_id = match attachments.get(parent) {
            Some(AttachmentData::Mesh(p)) => p.vertex_id,
            _ => {
                return Err(Error::invalid_data(format!(
                    "linked mesh '{name}' in skin '{skin}' references missing parent mesh '{parent}'"
                )));
            }
        };
        if mesh.inherit_deform {
            links.push((name.clone(), parent_id));
        }
    }
    for (name, parent_id) in links {
        if let Some(AttachmentData::Mesh(mesh)) = attachments.get_mut(&name) {
            mesh.deform_source_id = parent_id;
        }
    }
    Ok(())
}

fn validate_attachment_bones(
    skin: &str,
    attachment: &AttachmentData,
    bone_count: usize,
) -> Result<(), Error> {
    if let Some(MeshVertices::Weighted(vertices)) = attachment.vertices() {
        let missing = vertices.iter().flatten().any(|w| w.bone >= bone_count);
        if missing {
            return Err(Error::invalid_data(format!(
                "weighted attachment in skin '{skin}' references a missing bone"
            )));
        }
    }
    Ok(())
}

fn validate_animation(data: &SkeletonData, animation: &Animation) -> Result<(), Error> {
    let invalid = |timeline: &Timeline, message: String| {
        Error::invalid_data(format!(
            "{} timeline in animation '{}': {message}",
            timeline.kind_name(),
            animation.name
        ))
    };
    let check_index = |timeline: &Timeline, index: usize, len: usize, what: &str| {
        if index >= len {
            Err(invalid(timeline, format!("missing {what} {index}")))
        } else {
            Ok(())
        }
    };

    for timeline in &animation.timelines {
        let times = timeline.frame_times();
        if times.is_empty() {
            return Err(invalid(timeline, "no keyframes".to_string()));
        }
        if times.iter().any(|t| !t.is_finite()) {
            return Err(invalid(timeline, "keyframe times must be finite".to_string()));
        }
        if times.windows(2).any(|w| w[1] <= w[0]) {
            return Err(invalid(
                timeline,
                "keyframe times must be strictly ascending".to_string(),
            ));
        }

        match timeline {
            Timeline::Rotate(t) => check_index(timeline, t.bone_index, data.bones.len(), "bone")?,
            Timeline::Translate(t) => {
                check_index(timeline, t.bone_index, data.bones.len(), "bone")?
            }
            Timeline::Scale(t) => check_index(timeline, t.bone_index, data.bones.len(), "bone")?,
            Timeline::Shear(t) => check_index(timeline, t.bone_index, data.bones.len(), "bone")?,
            Timeline::Color(t) => check_index(timeline, t.slot_index, data.slots.len(), "slot")?,
            Timeline::TwoColor(t) => {
                check_index(timeline, t.slot_index, data.slots.len(), "slot")?
            }
            Timeline::Attachment(t) => {
                check_index(timeline, t.slot_index, data.slots.len(), "slot")?
            }
            Timeline::Deform(t) => {
                check_index(timeline, t.slot_index, data.slots.len(), "slot")?;
                let attachment = data
                    .skin(&t.skin)
                    .and_then(|s| s.attachment(t.slot_index, &t.attachment))
                    .ok_or_else(|| {
                        invalid(
                            timeline,
                            format!("unknown attachment '{}' in skin '{}'", t.attachment, t.skin),
                        )
                    })?;
                if attachment.vertices().is_none() {
                    return Err(invalid(
                        timeline,
                        format!("attachment '{}' has no vertices", t.attachment),
                    ));
                }
                let expected = attachment.deform_length();
                if t.frames.iter().any(|f| f.vertices.len() != expected) {
                    return Err(invalid(
                        timeline,
                        format!("every key must hold {expected} vertex values"),
                    ));
                }
            }
            Timeline::Event(_) => {}
            Timeline::DrawOrder(t) => {
                let slot_count = data.slots.len();
                for order in t.frames.iter().filter_map(|f| f.draw_order.as_ref()) {
                    let unique: HashSet<usize> = order.iter().copied().collect();
                    if order.len() != slot_count
                        || unique.len() != slot_count
                        || order.iter().any(|&i| i >= slot_count)
                    {
                        return Err(invalid(
                            timeline,
                            "draw order keys must be permutations of the slots".to_string(),
                        ));
                    }
                }
            }
            Timeline::IkConstraint(t) => check_index(
                timeline,
                t.constraint_index,
                data.ik_constraints.len(),
                "ik constraint",
            )?,
            Timeline::TransformConstraint(t) => check_index(
                timeline,
                t.constraint_index,
                data.transform_constraints.len(),
                "transform constraint",
            )?,
            Timeline::PathConstraintPosition(t) => check_index(
                timeline,
                t.constraint_index,
                data.path_constraints.len(),
                "path constraint",
            )?,
            Timeline::PathConstraintSpacing(t) => check_index(
                timeline,
                t.constraint_index,
                data.path_constraints.len(),
                "path constraint",
            )?,
            Timeline::PathConstraintMix(t) => check_index(
                timeline,
                t.constraint_index,
                data.path_constraints.len(),
                "path constraint",
            )?,
        }
    }
    Ok(())
}
