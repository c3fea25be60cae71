use super::animation::{
    MixDirection, MixPose, apply_rotate, apply_timeline, sample_rotate, wrap_degrees,
};
use crate::{Animation, Error, Event, RotateTimeline, Skeleton, SkeletonData, Timeline};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

const EMPTY_ANIMATION_NAME: &str = "<empty>";

/// How a timeline of a track entry is applied, recomputed whenever the tracks change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TimelineMode {
    /// An earlier entry already keys the property; blend from the current pose.
    Subsequent,
    /// First entry to key the property and the entry mixing in doesn't key it.
    First,
    /// The entry mixing in keys the property too; hold at full alpha until the mix ends.
    Dip,
    /// Like `Dip`, but a newer entry without the property fades the hold out.
    DipMix,
}

/// Mix durations between pairs of animations.
#[derive(Clone, Debug)]
pub struct AnimationStateData {
    pub skeleton_data: Arc<SkeletonData>,
    /// Used when no duration was set for a pair.
    pub default_mix: f32,
    mixes: HashMap<(String, String), f32>,
}

impl AnimationStateData {
    pub fn new(skeleton_data: Arc<SkeletonData>) -> Self {
        Self {
            skeleton_data,
            default_mix: 0.0,
            mixes: HashMap::new(),
        }
    }

    pub fn set_default_mix(&mut self, duration: f32) -> Result<(), Error> {
        validate_mix_duration(duration)?;
        self.default_mix = duration;
        Ok(())
    }

    /// Sets the crossfade duration used when changing from `from` to `to`.
    pub fn set_mix(&mut self, from: &str, to: &str, duration: f32) -> Result<(), Error> {
        validate_mix_duration(duration)?;
        for name in [from, to] {
            if self.skeleton_data.animation(name).is_none() {
                return Err(Error::not_found("animation", name));
            }
        }
        self.mixes
            .insert((from.to_string(), to.to_string()), duration);
        Ok(())
    }

    pub fn mix(&self, from: &str, to: &str) -> f32 {
        self.mixes
            .get(&(from.to_string(), to.to_string()))
            .copied()
            .unwrap_or(self.default_mix)
    }
}

fn validate_mix_duration(duration: f32) -> Result<(), Error> {
    non_negative("mix duration", duration).map(|_| ())
}

/// Animations checked against `expected` only index bones, slots and constraints `data` has too.
fn same_layout(data: &SkeletonData, expected: &SkeletonData) -> bool {
    data.bones.len() == expected.bones.len()
        && data.slots.len() == expected.slots.len()
        && data.ik_constraints.len() == expected.ik_constraints.len()
        && data.transform_constraints.len() == expected.transform_constraints.len()
        && data.path_constraints.len() == expected.path_constraints.len()
}

fn non_negative(what: &str, value: f32) -> Result<f32, Error> {
    if !value.is_finite() || value < 0.0 {
        return Err(Error::invalid_argument(format!(
            "{what} must be finite and >= 0"
        )));
    }
    Ok(value)
}

fn finite(what: &str, value: f32) -> Result<f32, Error> {
    if !value.is_finite() {
        return Err(Error::invalid_argument(format!("{what} must be finite")));
    }
    Ok(value)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct EntryId {
    index: usize,
    generation: u32,
}

#[derive(Debug)]
struct EntrySlot {
    generation: u32,
    entry: Option<TrackEntry>,
}

/// Playback state of one animation on a track, current or queued.
pub struct TrackEntry {
    animation: Arc<Animation>,
    track_index: usize,
    pub looped: bool,
    /// Seconds to wait before the entry starts, after which it becomes current.
    pub delay: f32,
    pub track_time: f32,
    pub track_last: f32,
    next_track_last: f32,
    /// Track time at which the entry is cleared from the track.
    pub track_end: f32,
    pub animation_start: f32,
    pub animation_end: f32,
    pub animation_last: f32,
    next_animation_last: f32,
    pub time_scale: f32,
    pub alpha: f32,
    pub mix_time: f32,
    pub mix_duration: f32,
    interrupt_alpha: f32,
    total_alpha: f32,
    /// Events fire while mixing out until the mix percentage reaches this value.
    pub event_threshold: f32,
    /// Attachment timelines apply while mixing out until the mix percentage reaches this value.
    pub attachment_threshold: f32,
    /// Draw order timelines apply while mixing out until the mix percentage reaches this value.
    pub draw_order_threshold: f32,
    mixing_from: Option<EntryId>,
    listener: Option<Box<dyn TrackEntryListener>>,

    property_ids: Vec<u64>,
    timeline_mode: Vec<TimelineMode>,
    timeline_dip_mix: Vec<Option<EntryId>>,
    timelines_rotation: Vec<f32>,
}

impl std::fmt::Debug for TrackEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackEntry")
            .field("animation", &self.animation.name)
            .field("track_index", &self.track_index)
            .field("looped", &self.looped)
            .field("delay", &self.delay)
            .field("track_time", &self.track_time)
            .field("track_last", &self.track_last)
            .field("track_end", &self.track_end)
            .field("animation_start", &self.animation_start)
            .field("animation_end", &self.animation_end)
            .field("animation_last", &self.animation_last)
            .field("time_scale", &self.time_scale)
            .field("alpha", &self.alpha)
            .field("mix_time", &self.mix_time)
            .field("mix_duration", &self.mix_duration)
            .field("mixing_from", &self.mixing_from)
            .finish()
    }
}

impl TrackEntry {
    fn new(
        data: &SkeletonData,
        track_index: usize,
        animation: Arc<Animation>,
        looped: bool,
        mix_duration: f32,
    ) -> Self {
        let property_ids = animation
            .timelines
            .iter()
            .map(|timeline| timeline.property_id(data))
            .collect();
        Self {
            track_index,
            looped,
            delay: 0.0,
            track_time: 0.0,
            track_last: -1.0,
            next_track_last: -1.0,
            track_end: f32::MAX,
            animation_start: 0.0,
            animation_end: animation.duration,
            animation_last: -1.0,
            next_animation_last: -1.0,
            time_scale: 1.0,
            alpha: 1.0,
            mix_time: 0.0,
            mix_duration,
            interrupt_alpha: 1.0,
            total_alpha: 0.0,
            event_threshold: 0.0,
            attachment_threshold: 0.0,
            draw_order_threshold: 0.0,
            mixing_from: None,
            listener: None,
            property_ids,
            timeline_mode: Vec::new(),
            timeline_dip_mix: Vec::new(),
            timelines_rotation: Vec::new(),
            animation,
        }
    }

    pub fn animation(&self) -> &Arc<Animation> {
        &self.animation
    }

    pub fn track_index(&self) -> usize {
        self.track_index
    }

    /// Time within the animation: wrapped into `[animation_start, animation_end)` when looping,
    /// clamped to `animation_end` otherwise.
    pub fn animation_time(&self) -> f32 {
        if self.looped {
            let duration = self.animation_end - self.animation_start;
            if duration == 0.0 {
                return self.animation_start;
            }
            return self.track_time % duration + self.animation_start;
        }
        (self.track_time + self.animation_start).min(self.animation_end)
    }

    /// True once at least one full iteration has played.
    pub fn is_complete(&self) -> bool {
        self.track_time >= self.animation_end - self.animation_start
    }

    /// The entry being crossfaded out while this one mixes in.
    pub fn mixing_from(&self) -> Option<TrackEntryHandle> {
        self.mixing_from.map(|id| TrackEntryHandle { id })
    }

    fn has_timeline(&self, id: u64) -> bool {
        self.property_ids.contains(&id)
    }
}

/// Copyable reference to a track entry. Goes stale once the entry is disposed; operations on a
/// stale handle do nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TrackEntryHandle {
    id: EntryId,
}

impl TrackEntryHandle {
    fn with_entry_mut(&self, state: &mut AnimationState, f: impl FnOnce(&mut TrackEntry)) {
        if let Some(entry) = state.entry_mut(self.id) {
            f(entry);
        }
    }

    pub fn is_alive(&self, state: &AnimationState) -> bool {
        state.entry(self.id).is_some()
    }

    pub fn set_listener<L: TrackEntryListener + 'static>(
        &self,
        state: &mut AnimationState,
        listener: L,
    ) {
        self.with_entry_mut(state, |entry| {
            entry.listener = Some(Box::new(listener));
        });
    }

    pub fn set_loop(&self, state: &mut AnimationState, looped: bool) {
        self.with_entry_mut(state, |entry| entry.looped = looped);
    }

    // The setters below reject NaN and infinities (and negatives where a time or duration is
    // expected) without touching the entry. A stale handle is a no-op.

    pub fn set_delay(&self, state: &mut AnimationState, delay: f32) -> Result<(), Error> {
        let delay = non_negative("delay", delay)?;
        self.with_entry_mut(state, |entry| entry.delay = delay);
        Ok(())
    }

    pub fn set_track_time(&self, state: &mut AnimationState, track_time: f32) -> Result<(), Error> {
        let track_time = non_negative("track time", track_time)?;
        self.with_entry_mut(state, |entry| entry.track_time = track_time);
        Ok(())
    }

    /// `f32::MAX` (the default) never ends the entry.
    pub fn set_track_end(&self, state: &mut AnimationState, track_end: f32) -> Result<(), Error> {
        let track_end = non_negative("track end", track_end)?;
        self.with_entry_mut(state, |entry| entry.track_end = track_end);
        Ok(())
    }

    pub fn set_time_scale(&self, state: &mut AnimationState, time_scale: f32) -> Result<(), Error> {
        let time_scale = non_negative("time scale", time_scale)?;
        self.with_entry_mut(state, |entry| entry.time_scale = time_scale);
        Ok(())
    }

    pub fn set_alpha(&self, state: &mut AnimationState, alpha: f32) -> Result<(), Error> {
        let alpha = finite("alpha", alpha)?;
        self.with_entry_mut(state, |entry| entry.alpha = alpha);
        Ok(())
    }

    pub fn set_mix_duration(
        &self,
        state: &mut AnimationState,
        mix_duration: f32,
    ) -> Result<(), Error> {
        let mix_duration = non_negative("mix duration", mix_duration)?;
        self.with_entry_mut(state, |entry| entry.mix_duration = mix_duration);
        Ok(())
    }

    pub fn set_event_threshold(
        &self,
        state: &mut AnimationState,
        threshold: f32,
    ) -> Result<(), Error> {
        let threshold = finite("event threshold", threshold)?;
        self.with_entry_mut(state, |entry| entry.event_threshold = threshold);
        Ok(())
    }

    pub fn set_attachment_threshold(
        &self,
        state: &mut AnimationState,
        threshold: f32,
    ) -> Result<(), Error> {
        let threshold = finite("attachment threshold", threshold)?;
        self.with_entry_mut(state, |entry| entry.attachment_threshold = threshold);
        Ok(())
    }

    pub fn set_draw_order_threshold(
        &self,
        state: &mut AnimationState,
        threshold: f32,
    ) -> Result<(), Error> {
        let threshold = finite("draw order threshold", threshold)?;
        self.with_entry_mut(state, |entry| entry.draw_order_threshold = threshold);
        Ok(())
    }

    pub fn set_animation_start(
        &self,
        state: &mut AnimationState,
        animation_start: f32,
    ) -> Result<(), Error> {
        let animation_start = finite("animation start", animation_start)?;
        self.with_entry_mut(state, |entry| entry.animation_start = animation_start);
        Ok(())
    }

    pub fn set_animation_end(
        &self,
        state: &mut AnimationState,
        animation_end: f32,
    ) -> Result<(), Error> {
        let animation_end = finite("animation end", animation_end)?;
        self.with_entry_mut(state, |entry| entry.animation_end = animation_end);
        Ok(())
    }

    pub fn set_animation_last(
        &self,
        state: &mut AnimationState,
        animation_last: f32,
    ) -> Result<(), Error> {
        let animation_last = finite("animation last", animation_last)?;
        self.with_entry_mut(state, |entry| {
            entry.animation_last = animation_last;
            entry.next_animation_last = animation_last;
        });
        Ok(())
    }

    /// Forgets the rotation direction used to mix out, so the next mix picks the shortest route.
    pub fn reset_rotation_directions(&self, state: &mut AnimationState) {
        self.with_entry_mut(state, |entry| entry.timelines_rotation.clear());
    }
}

/// Entry details handed to listeners, which cannot borrow the entry while the state is mutable.
#[derive(Clone, Debug)]
pub struct TrackEntrySnapshot {
    pub handle: TrackEntryHandle,
    pub track_index: usize,
    pub animation_name: String,
    pub looped: bool,
    pub track_time: f32,
    pub animation_time: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum AnimationStateEvent {
    /// The entry became current.
    Start,
    /// Another entry replaced this one as current.
    Interrupt,
    /// The entry will never be applied again.
    End,
    /// The entry is freed; its handle is stale after this.
    Dispose,
    /// A loop iteration or the whole animation finished.
    Complete,
    Event(Event),
}

pub trait TrackEntryListener {
    fn on_event(
        &mut self,
        state: &mut AnimationState,
        entry: &TrackEntrySnapshot,
        event: &AnimationStateEvent,
    );
}

pub trait AnimationStateListener {
    fn on_event(
        &mut self,
        state: &mut AnimationState,
        entry: &TrackEntrySnapshot,
        event: &AnimationStateEvent,
    );
}

#[derive(Clone, Debug)]
struct QueuedEvent {
    entry: EntryId,
    event: AnimationStateEvent,
}

#[derive(Default)]
struct Track {
    current: Option<EntryId>,
    queue: VecDeque<EntryId>,
}

/// Applies animations over time, queues animations for later playback, and crossfades between
/// them. Tracks are applied from lowest to highest so higher tracks layer over lower ones.
pub struct AnimationState {
    data: AnimationStateData,
    empty_animation: Arc<Animation>,
    tracks: Vec<Track>,
    entries: Vec<EntrySlot>,
    free_list: Vec<usize>,
    event_queue: VecDeque<QueuedEvent>,
    listener: Option<Box<dyn AnimationStateListener>>,
    draining_events: bool,
    drain_disabled: bool,
    animations_changed: bool,
    time_scale: f32,
}

impl AnimationState {
    pub fn new(data: AnimationStateData) -> Self {
        Self {
            data,
            empty_animation: Arc::new(Animation::new(EMPTY_ANIMATION_NAME, Vec::new())),
            tracks: Vec::new(),
            entries: Vec::new(),
            free_list: Vec::new(),
            event_queue: VecDeque::new(),
            listener: None,
            draining_events: false,
            drain_disabled: false,
            animations_changed: false,
            time_scale: 1.0,
        }
    }

    pub fn data(&self) -> &AnimationStateData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut AnimationStateData {
        &mut self.data
    }

    pub fn set_listener<L: AnimationStateListener + 'static>(&mut self, listener: L) {
        self.listener = Some(Box::new(listener));
    }

    pub fn clear_listener(&mut self) {
        self.listener = None;
    }

    pub fn time_scale(&self) -> f32 {
        self.time_scale
    }

    /// Multiplier for every delta passed to `update`.
    pub fn set_time_scale(&mut self, time_scale: f32) -> Result<(), Error> {
        self.time_scale = non_negative("time scale", time_scale)?;
        Ok(())
    }

    pub fn tracks_len(&self) -> usize {
        self.tracks.len()
    }

    /// The entry currently playing on `track_index`.
    pub fn current(&self, track_index: usize) -> Option<TrackEntryHandle> {
        let id = self.tracks.get(track_index)?.current?;
        Some(TrackEntryHandle { id })
    }

    pub fn track_entry(&self, handle: TrackEntryHandle) -> Option<&TrackEntry> {
        self.entry(handle.id)
    }

    /// Entries waiting on `track_index`, in playback order.
    pub fn queued(&self, track_index: usize) -> Vec<TrackEntryHandle> {
        self.tracks
            .get(track_index)
            .map(|track| {
                track
                    .queue
                    .iter()
                    .map(|&id| TrackEntryHandle { id })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn set_animation_by_name(
        &mut self,
        track_index: usize,
        animation_name: &str,
        looped: bool,
    ) -> Result<TrackEntryHandle, Error> {
        let animation = Arc::clone(self.data.skeleton_data.find_animation(animation_name)?);
        self.set_animation(track_index, &animation, looped)
    }

    /// Plays `animation` on the track now, discarding queued entries. The previous current entry
    /// is crossfaded out, unless it was never applied, in which case it is dropped.
    ///
    /// An animation that keys bones, slots or constraints missing from the state's skeleton data
    /// is rejected with [`Error::InvalidArgument`] and the track is left as it was.
    pub fn set_animation(
        &mut self,
        track_index: usize,
        animation: &Arc<Animation>,
        looped: bool,
    ) -> Result<TrackEntryHandle, Error> {
        self.data.skeleton_data.check_animation(animation)?;
        self.ensure_track(track_index);
        let mut interrupt = true;
        let mut current = self.tracks[track_index].current;
        if let Some(current_id) = current {
            let (never_applied, mixing_from) = self
                .entry(current_id)
                .map_or((false, None), |e| (e.next_track_last == -1.0, e.mixing_from));
            if never_applied {
                self.tracks[track_index].current = mixing_from;
                if let Some(entry) = self.entry_mut(current_id) {
                    entry.mixing_from = None;
                }
                self.queue_event(current_id, AnimationStateEvent::Interrupt);
                self.queue_end(current_id);
                current = mixing_from;
                interrupt = false;
            }
            self.dispose_next(track_index);
        }

        let entry_id = self.new_track_entry(track_index, animation, looped, current);
        self.set_current(track_index, entry_id, interrupt);
        self.drain();
        Ok(TrackEntryHandle { id: entry_id })
    }

    pub fn add_animation_by_name(
        &mut self,
        track_index: usize,
        animation_name: &str,
        looped: bool,
        delay: f32,
    ) -> Result<TrackEntryHandle, Error> {
        let animation = Arc::clone(self.data.skeleton_data.find_animation(animation_name)?);
        self.add_animation(track_index, &animation, looped, delay)
    }

    /// Queues `animation` after the last entry on the track. A `delay <= 0` is relative to the
    /// end of the previous entry minus the mix duration; on an empty track it plays immediately.
    pub fn add_animation(
        &mut self,
        track_index: usize,
        animation: &Arc<Animation>,
        looped: bool,
        delay: f32,
    ) -> Result<TrackEntryHandle, Error> {
        let mut delay = finite("delay", delay)?;
        self.data.skeleton_data.check_animation(animation)?;
        self.ensure_track(track_index);
        let last = {
            let track = &self.tracks[track_index];
            track.queue.back().copied().or(track.current)
        };

        let entry_id = self.new_track_entry(track_index, animation, looped, last);
        match last {
            None => {
                self.set_current(track_index, entry_id, true);
                self.drain();
            }
            Some(last_id) => {
                self.tracks[track_index].queue.push_back(entry_id);
                if delay <= 0.0 {
                    if let Some(last) = self.entry(last_id) {
                        let duration = last.animation_end - last.animation_start;
                        if duration != 0.0 {
                            delay += if last.looped {
                                duration * (1.0 + (last.track_time / duration).trunc())
                            } else {
                                duration
                            };
                            delay -= self.data.mix(&last.animation.name, &animation.name);
                        } else {
                            delay = 0.0;
                        }
                    }
                }
            }
        }

        if let Some(entry) = self.entry_mut(entry_id) {
            entry.delay = delay;
        }
        Ok(TrackEntryHandle { id: entry_id })
    }

    /// Mixes from the current entry to the setup pose over `mix_duration`, then clears the track.
    pub fn set_empty_animation(
        &mut self,
        track_index: usize,
        mix_duration: f32,
    ) -> Result<TrackEntryHandle, Error> {
        validate_mix_duration(mix_duration)?;
        let empty = Arc::clone(&self.empty_animation);
        let handle = self.set_animation(track_index, &empty, false)?;
        handle.set_mix_duration(self, mix_duration)?;
        handle.set_track_end(self, mix_duration)?;
        Ok(handle)
    }

    /// Queues a mix to the setup pose. A `delay <= 0` lets the mix finish when the previous
    /// entry ends.
    pub fn add_empty_animation(
        &mut self,
        track_index: usize,
        mix_duration: f32,
        mut delay: f32,
    ) -> Result<TrackEntryHandle, Error> {
        validate_mix_duration(mix_duration)?;
        if delay <= 0.0 {
            delay -= mix_duration;
        }
        let empty = Arc::clone(&self.empty_animation);
        let handle = self.add_animation(track_index, &empty, false, delay)?;
        handle.set_mix_duration(self, mix_duration)?;
        handle.set_track_end(self, mix_duration)?;
        Ok(handle)
    }

    /// Mixes every track with a current entry to the setup pose.
    pub fn set_empty_animations(&mut self, mix_duration: f32) -> Result<(), Error> {
        validate_mix_duration(mix_duration)?;
        let old_drain_disabled = self.drain_disabled;
        self.drain_disabled = true;
        for track_index in 0..self.tracks.len() {
            if self.tracks[track_index].current.is_some() {
                self.set_empty_animation(track_index, mix_duration)?;
            }
        }
        self.drain_disabled = old_drain_disabled;
        self.drain();
        Ok(())
    }

    /// Ends the current entry, everything it mixes from and every queued entry. The skeleton
    /// keeps its last pose.
    pub fn clear_track(&mut self, track_index: usize) {
        self.clear_track_internal(track_index);
        self.drain();
    }

    pub fn clear_tracks(&mut self) {
        let old_drain_disabled = self.drain_disabled;
        self.drain_disabled = true;
        for track_index in 0..self.tracks.len() {
            self.clear_track_internal(track_index);
        }
        self.tracks.clear();
        self.drain_disabled = old_drain_disabled;
        self.drain();
    }

    /// Advances every track by `delta` seconds scaled by the state and entry time scales.
    pub fn update(&mut self, delta: f32) {
        if !delta.is_finite() {
            log::warn!("ignoring non-finite animation state delta {delta}");
            return;
        }
        let delta = delta * self.time_scale;

        for track_index in 0..self.tracks.len() {
            let Some(current_id) = self.tracks[track_index].current else {
                continue;
            };
            let Some(current) = self.entry_mut(current_id) else {
                self.tracks[track_index].current = None;
                continue;
            };

            current.animation_last = current.next_animation_last;
            current.track_last = current.next_track_last;

            let mut current_delta = delta * current.time_scale;
            if current.delay > 0.0 {
                current.delay -= current_delta;
                if current.delay > 0.0 {
                    continue;
                }
                current_delta = -current.delay;
                current.delay = 0.0;
            }
            let track_last = current.track_last;
            let track_end = current.track_end;
            let current_time_scale = current.time_scale;
            let mixing_from = current.mixing_from;

            if let Some(&next_id) = self.tracks[track_index].queue.front() {
                let next_delay = self.entry(next_id).map_or(0.0, |next| next.delay);
                // Promote the next entry once its delay has passed, keeping the leftover time. A
                // paused entry hands over no leftover time.
                let next_time = track_last - next_delay;
                if next_time >= 0.0 {
                    self.tracks[track_index].queue.pop_front();
                    if let Some(next) = self.entry_mut(next_id) {
                        next.delay = 0.0;
                        if current_time_scale != 0.0 {
                            next.track_time +=
                                (next_time / current_time_scale + delta) * next.time_scale;
                        }
                    }
                    if let Some(current) = self.entry_mut(current_id) {
                        current.track_time += current_delta;
                    }
                    self.set_current(track_index, next_id, true);
                    let mut id = next_id;
                    while let Some(entry) = self.entry_mut(id) {
                        let Some(from) = entry.mixing_from else {
                            break;
                        };
                        entry.mix_time += delta;
                        id = from;
                    }
                    continue;
                }
            } else if track_last >= track_end && mixing_from.is_none() {
                self.tracks[track_index].current = None;
                self.queue_end(current_id);
                continue;
            }

            if mixing_from.is_some() && self.update_mixing_from(current_id, delta) {
                let mut from = self
                    .entry_mut(current_id)
                    .and_then(|current| current.mixing_from.take());
                while let Some(id) = from {
                    from = self
                        .entry_mut(id)
                        .and_then(|entry| entry.mixing_from.take());
                    self.queue_end(id);
                }
            }
            if let Some(current) = self.entry_mut(current_id) {
                current.track_time += current_delta;
            }
        }

        self.drain();
    }

    /// Returns true when the mixing-from chain of `to_id` has fully finished.
    fn update_mixing_from(&mut self, to_id: EntryId, delta: f32) -> bool {
        let Some(from_id) = self.entry(to_id).and_then(|to| to.mixing_from) else {
            return true;
        };
        let finished = self.update_mixing_from(from_id, delta);

        let Some(from) = self.entry_mut(from_id) else {
            return finished;
        };
        from.animation_last = from.next_animation_last;
        from.track_last = from.next_track_last;
        let from_total_alpha = from.total_alpha;
        let from_mixing_from = from.mixing_from;
        let from_interrupt_alpha = from.interrupt_alpha;

        let Some(to) = self.entry_mut(to_id) else {
            return finished;
        };
        // mix_time > 0 means the entry mixing out was applied at least once.
        if to.mix_time > 0.0 && to.mix_time >= to.mix_duration {
            // Mixing is only done once the entry mixing out contributes nothing, unless the
            // transition is a single frame.
            if from_total_alpha == 0.0 || to.mix_duration == 0.0 {
                to.mixing_from = from_mixing_from;
                to.interrupt_alpha = from_interrupt_alpha;
                if let Some(from) = self.entry_mut(from_id) {
                    from.mixing_from = None;
                }
                self.queue_end(from_id);
            }
            return finished;
        }

        // Mix time follows the state's time scale but not the entries' own.
        to.mix_time += delta;
        if let Some(from) = self.entry_mut(from_id) {
            from.track_time += delta * from.time_scale;
        }
        false
    }

    /// Poses the skeleton using every track's current entry and the entries it mixes from.
    /// Returns false when no track had anything to apply.
    pub fn apply(&mut self, skeleton: &mut Skeleton) -> bool {
        if !Arc::ptr_eq(&skeleton.data, &self.data.skeleton_data)
            && !same_layout(&skeleton.data, &self.data.skeleton_data)
        {
            log::warn!("skeleton data does not match the animation state data, nothing applied");
            return false;
        }
        if self.animations_changed {
            self.animations_changed();
        }

        let mut applied = false;
        for track_index in 0..self.tracks.len() {
            let Some(current_id) = self.tracks[track_index].current else {
                continue;
            };
            let Some(current) = self.entry(current_id) else {
                continue;
            };
            if current.delay > 0.0 {
                continue;
            }
            applied = true;
            let current_pose = if track_index == 0 {
                MixPose::Current
            } else {
                MixPose::CurrentLayered
            };
            let mut mix = current.alpha;
            let mixing = current.mixing_from.is_some();
            let track_ended = current.track_time >= current.track_end;

            if mixing {
                mix *= self.apply_mixing_from(current_id, skeleton, current_pose);
            } else if track_ended && self.tracks[track_index].queue.is_empty() {
                // Last apply before the track clears: back to the setup pose.
                mix = 0.0;
            }

            let Some(current) = self.entry_mut(current_id) else {
                continue;
            };
            let animation = Arc::clone(&current.animation);
            let animation_last = current.animation_last;
            let animation_time = current.animation_time();
            let mut events = Vec::new();

            if mix == 1.0 {
                for timeline in &animation.timelines {
                    apply_timeline(
                        timeline,
                        skeleton,
                        animation_last,
                        animation_time,
                        Some(&mut events),
                        1.0,
                        MixPose::Setup,
                        MixDirection::In,
                    );
                }
            } else {
                let first_frame = current.timelines_rotation.is_empty();
                let mut rotation = std::mem::take(&mut current.timelines_rotation);
                if first_frame {
                    rotation.resize(animation.timelines.len() * 2, 0.0);
                }
                for (i, timeline) in animation.timelines.iter().enumerate() {
                    let pose = match current.timeline_mode.get(i) {
                        Some(TimelineMode::Subsequent) => current_pose,
                        _ => MixPose::Setup,
                    };
                    match timeline {
                        Timeline::Rotate(rotate) => apply_rotate_mixed(
                            rotate,
                            skeleton,
                            animation_time,
                            mix,
                            pose,
                            &mut rotation[i * 2..i * 2 + 2],
                            first_frame,
                        ),
                        _ => apply_timeline(
                            timeline,
                            skeleton,
                            animation_last,
                            animation_time,
                            Some(&mut events),
                            mix,
                            pose,
                            MixDirection::In,
                        ),
                    }
                }
                current.timelines_rotation = rotation;
            }

            self.queue_events(current_id, animation_time, &events);
            if let Some(current) = self.entry_mut(current_id) {
                current.next_animation_last = animation_time;
                current.next_track_last = current.track_time;
            }
        }

        self.drain();
        applied
    }

    /// Applies the entries `to_id` mixes from, oldest first, and returns the mix percentage of
    /// `to_id`.
    fn apply_mixing_from(
        &mut self,
        to_id: EntryId,
        skeleton: &mut Skeleton,
        current_pose: MixPose,
    ) -> f32 {
        let Some(to) = self.entry(to_id) else {
            return 1.0;
        };
        let Some(from_id) = to.mixing_from else {
            return 1.0;
        };
        if self.entry(from_id).is_some_and(|from| from.mixing_from.is_some()) {
            self.apply_mixing_from(from_id, skeleton, current_pose);
        }

        let Some(to) = self.entry(to_id) else {
            return 1.0;
        };
        let to_mix_duration = to.mix_duration;
        let to_interrupt_alpha = to.interrupt_alpha;
        let (mix, current_pose) = if to_mix_duration == 0.0 {
            // Single frame mix to undo the changes of the entry mixing out.
            (1.0, MixPose::Setup)
        } else {
            ((to.mix_time / to_mix_duration).min(1.0), current_pose)
        };

        let Some(from) = self.entry(from_id) else {
            return mix;
        };
        let dip_fade: Vec<f32> = from
            .timeline_dip_mix
            .iter()
            .map(|dip| {
                dip.and_then(|id| self.entry(id))
                    .map_or(1.0, |dip| (1.0 - dip.mix_time / dip.mix_duration).max(0.0))
            })
            .collect();

        let Some(from) = self.entry_mut(from_id) else {
            return mix;
        };
        let collect_events = mix < from.event_threshold;
        let attachments = mix < from.attachment_threshold;
        let draw_order = mix < from.draw_order_threshold;
        let animation = Arc::clone(&from.animation);
        let animation_last = from.animation_last;
        let animation_time = from.animation_time();
        let alpha_dip = from.alpha * to_interrupt_alpha;
        let alpha_mix = alpha_dip * (1.0 - mix);

        let first_frame = from.timelines_rotation.is_empty();
        let mut rotation = std::mem::take(&mut from.timelines_rotation);
        if first_frame {
            rotation.resize(animation.timelines.len() * 2, 0.0);
        }

        let mut events = Vec::new();
        from.total_alpha = 0.0;
        for (i, timeline) in animation.timelines.iter().enumerate() {
            let mode = from
                .timeline_mode
                .get(i)
                .copied()
                .unwrap_or(TimelineMode::First);
            let (pose, alpha) = match mode {
                TimelineMode::Subsequent => {
                    if !attachments && matches!(timeline, Timeline::Attachment(_)) {
                        continue;
                    }
                    if !draw_order && matches!(timeline, Timeline::DrawOrder(_)) {
                        continue;
                    }
                    (current_pose, alpha_mix)
                }
                TimelineMode::First => (MixPose::Setup, alpha_mix),
                TimelineMode::Dip => (MixPose::Setup, alpha_dip),
                TimelineMode::DipMix => (
                    MixPose::Setup,
                    alpha_dip * dip_fade.get(i).copied().unwrap_or(1.0),
                ),
            };
            from.total_alpha += alpha;

            match timeline {
                Timeline::Rotate(rotate) => apply_rotate_mixed(
                    rotate,
                    skeleton,
                    animation_time,
                    alpha,
                    pose,
                    &mut rotation[i * 2..i * 2 + 2],
                    first_frame,
                ),
                _ => apply_timeline(
                    timeline,
                    skeleton,
                    animation_last,
                    animation_time,
                    collect_events.then_some(&mut events),
                    alpha,
                    pose,
                    MixDirection::Out,
                ),
            }
        }
        from.timelines_rotation = rotation;
        from.next_animation_last = animation_time;
        from.next_track_last = from.track_time;

        if to_mix_duration > 0.0 {
            self.queue_events(from_id, animation_time, &events);
        }
        mix
    }

    /// Queues the collected events and a complete event if a loop or the animation finished.
    /// Events past the loop boundary are queued after the complete event.
    fn queue_events(&mut self, entry_id: EntryId, animation_time: f32, events: &[Event]) {
        let Some(entry) = self.entry(entry_id) else {
            return;
        };
        let animation_start = entry.animation_start;
        let animation_end = entry.animation_end;
        let duration = animation_end - animation_start;
        let track_last_wrapped = if duration != 0.0 {
            entry.track_last % duration
        } else {
            0.0
        };

        let complete = if entry.looped {
            // One complete per apply, however many iterations the delta spanned.
            duration == 0.0
                || (entry.track_time / duration).floor()
                    > (entry.track_last.max(0.0) / duration).floor()
        } else {
            animation_time >= animation_end && entry.animation_last < animation_end
        };

        let mut queued = Vec::with_capacity(events.len() + 1);
        let mut i = 0;
        while i < events.len() {
            let event = &events[i];
            if event.time < track_last_wrapped {
                break;
            }
            if event.time <= animation_end {
                queued.push(AnimationStateEvent::Event(event.clone()));
            }
            i += 1;
        }
        if complete {
            queued.push(AnimationStateEvent::Complete);
        }
        for event in &events[i..] {
            if event.time >= animation_start {
                queued.push(AnimationStateEvent::Event(event.clone()));
            }
        }

        for event in queued {
            self.queue_event(entry_id, event);
        }
    }

    /// Recomputes how each timeline of every entry is applied, walking tracks low to high and
    /// each track from the oldest entry mixing out to the current entry.
    fn animations_changed(&mut self) {
        self.animations_changed = false;
        let mut property_ids = HashSet::new();
        let mut mixing_to = Vec::new();
        for track_index in 0..self.tracks.len() {
            if let Some(current) = self.tracks[track_index].current {
                self.set_timeline_modes(current, None, &mut mixing_to, &mut property_ids);
            }
        }
    }

    fn set_timeline_modes(
        &mut self,
        entry_id: EntryId,
        to: Option<EntryId>,
        mixing_to: &mut Vec<EntryId>,
        property_ids: &mut HashSet<u64>,
    ) {
        if let Some(to) = to {
            mixing_to.push(to);
        }
        if let Some(from) = self.entry(entry_id).and_then(|entry| entry.mixing_from) {
            self.set_timeline_modes(from, Some(entry_id), mixing_to, property_ids);
        }
        if to.is_some() {
            mixing_to.pop();
        }

        let Some(entry) = self.entry(entry_id) else {
            return;
        };
        let to_entry = to.and_then(|id| self.entry(id));
        let mut modes = Vec::with_capacity(entry.property_ids.len());
        let mut dip_mix = vec![None; entry.property_ids.len()];
        for (i, &id) in entry.property_ids.iter().enumerate() {
            let mode = if !property_ids.insert(id) {
                TimelineMode::Subsequent
            } else if !to_entry.is_some_and(|to| to.has_timeline(id)) {
                TimelineMode::First
            } else {
                let mut mode = TimelineMode::Dip;
                for &newer_id in mixing_to.iter().rev() {
                    let Some(newer) = self.entry(newer_id) else {
                        continue;
                    };
                    if !newer.has_timeline(id) {
                        if newer.mix_duration > 0.0 {
                            mode = TimelineMode::DipMix;
                            dip_mix[i] = Some(newer_id);
                        }
                        break;
                    }
                }
                mode
            };
            modes.push(mode);
        }

        if let Some(entry) = self.entry_mut(entry_id) {
            entry.timeline_mode = modes;
            entry.timeline_dip_mix = dip_mix;
        }
    }

    fn new_track_entry(
        &mut self,
        track_index: usize,
        animation: &Arc<Animation>,
        looped: bool,
        last: Option<EntryId>,
    ) -> EntryId {
        let mix_duration = last
            .and_then(|id| self.entry(id))
            .map_or(0.0, |last| self.data.mix(&last.animation.name, &animation.name));
        let entry = TrackEntry::new(
            &self.data.skeleton_data,
            track_index,
            Arc::clone(animation),
            looped,
            mix_duration,
        );
        self.alloc_entry(entry)
    }

    fn set_current(&mut self, track_index: usize, current_id: EntryId, interrupt: bool) {
        let from = self.tracks[track_index].current.replace(current_id);
        if let Some(from_id) = from {
            if interrupt {
                self.queue_event(from_id, AnimationStateEvent::Interrupt);
            }
            // Store the interrupted mix percentage.
            let interrupted_mix = self
                .entry(from_id)
                .filter(|from| from.mixing_from.is_some() && from.mix_duration > 0.0)
                .map(|from| (from.mix_time / from.mix_duration).min(1.0));
            if let Some(current) = self.entry_mut(current_id) {
                current.mixing_from = Some(from_id);
                current.mix_time = 0.0;
                if let Some(interrupted_mix) = interrupted_mix {
                    current.interrupt_alpha *= interrupted_mix;
                }
            }
            // Mixing out picks the shortest rotation again.
            if let Some(from) = self.entry_mut(from_id) {
                from.timelines_rotation.clear();
            }
        }
        self.queue_event(current_id, AnimationStateEvent::Start);
    }

    fn dispose_next(&mut self, track_index: usize) {
        let queued: Vec<EntryId> = self.tracks[track_index].queue.drain(..).collect();
        for id in queued {
            self.queue_event(id, AnimationStateEvent::Dispose);
        }
    }

    fn clear_track_internal(&mut self, track_index: usize) {
        let Some(track) = self.tracks.get_mut(track_index) else {
            return;
        };
        let Some(current_id) = track.current.take() else {
            return;
        };
        self.queue_end(current_id);
        self.dispose_next(track_index);

        let mut from = self
            .entry_mut(current_id)
            .and_then(|entry| entry.mixing_from.take());
        while let Some(id) = from {
            from = self
                .entry_mut(id)
                .and_then(|entry| entry.mixing_from.take());
            self.queue_end(id);
        }
    }

    fn ensure_track(&mut self, track_index: usize) {
        if track_index >= self.tracks.len() {
            self.tracks.resize_with(track_index + 1, Track::default);
        }
    }

    fn queue_event(&mut self, entry: EntryId, event: AnimationStateEvent) {
        if matches!(event, AnimationStateEvent::Start | AnimationStateEvent::End) {
            self.animations_changed = true;
        }
        self.event_queue.push_back(QueuedEvent { entry, event });
    }

    fn queue_end(&mut self, entry: EntryId) {
        self.queue_event(entry, AnimationStateEvent::End);
        self.queue_event(entry, AnimationStateEvent::Dispose);
    }

    /// Delivers queued events in order. Listeners may mutate the state; anything they queue is
    /// delivered by this same loop.
    fn drain(&mut self) {
        if self.draining_events || self.drain_disabled {
            return;
        }
        self.draining_events = true;

        while let Some(QueuedEvent { entry, event }) = self.event_queue.pop_front() {
            let snapshot = self.snapshot(entry);
            match &event {
                AnimationStateEvent::Event(e) => log::trace!(
                    "track {} '{}': event '{}' at {}",
                    snapshot.track_index,
                    snapshot.animation_name,
                    e.name,
                    e.time
                ),
                AnimationStateEvent::Complete | AnimationStateEvent::Dispose => log::trace!(
                    "track {} '{}': {:?}",
                    snapshot.track_index,
                    snapshot.animation_name,
                    event
                ),
                _ => log::debug!(
                    "track {} '{}': {:?}",
                    snapshot.track_index,
                    snapshot.animation_name,
                    event
                ),
            }

            let mut entry_listener = self
                .entry_mut(entry)
                .and_then(|entry| entry.listener.take());
            if let Some(listener) = entry_listener.as_mut() {
                listener.on_event(self, &snapshot, &event);
            }

            let mut state_listener = self.listener.take();
            if let Some(listener) = state_listener.as_mut() {
                listener.on_event(self, &snapshot, &event);
            }
            if self.listener.is_none() {
                self.listener = state_listener;
            }

            if event == AnimationStateEvent::Dispose {
                self.free_entry(entry);
            } else if let Some(listener) = entry_listener {
                if let Some(entry) = self.entry_mut(entry) {
                    if entry.listener.is_none() {
                        entry.listener = Some(listener);
                    }
                }
            }
        }

        self.draining_events = false;
    }

    fn snapshot(&self, id: EntryId) -> TrackEntrySnapshot {
        let handle = TrackEntryHandle { id };
        match self.entry(id) {
            Some(entry) => TrackEntrySnapshot {
                handle,
                track_index: entry.track_index,
                animation_name: entry.animation.name.clone(),
                looped: entry.looped,
                track_time: entry.track_time,
                animation_time: entry.animation_time(),
            },
            None => TrackEntrySnapshot {
                handle,
                track_index: 0,
                animation_name: String::new(),
                looped: false,
                track_time: 0.0,
                animation_time: 0.0,
            },
        }
    }

    fn alloc_entry(&mut self, entry: TrackEntry) -> EntryId {
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.entries[index];
            slot.entry = Some(entry);
            EntryId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.entries.len();
            self.entries.push(EntrySlot {
                generation: 0,
                entry: Some(entry),
            });
            EntryId {
                index,
                generation: 0,
            }
        }
    }

    fn entry(&self, id: EntryId) -> Option<&TrackEntry> {
        let slot = self.entries.get(id.index)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_ref()
    }

    fn entry_mut(&mut self, id: EntryId) -> Option<&mut TrackEntry> {
        let slot = self.entries.get_mut(id.index)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_mut()
    }

    fn free_entry(&mut self, id: EntryId) {
        let Some(slot) = self.entries.get_mut(id.index) else {
            return;
        };
        if slot.generation != id.generation || slot.entry.is_none() {
            return;
        }
        slot.entry = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(id.index);
    }
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

/// Applies a rotate timeline while mixing, following the shortest route on the first frame and
/// keeping that direction afterwards, even when the bones rotate past each other.
/// `state` holds the accumulated total and the last difference.
fn apply_rotate_mixed(
    timeline: &RotateTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    pose: MixPose,
    state: &mut [f32],
    first_frame: bool,
) {
    if first_frame {
        state[0] = 0.0;
    }
    if alpha == 1.0 {
        apply_rotate(timeline, skeleton, time, 1.0, pose);
        return;
    }

    let setup = skeleton.data.bones[timeline.bone_index].rotation;
    let bone = &mut skeleton.bones[timeline.bone_index];
    let frames = &timeline.frames;
    if time < frames[0].time {
        if pose == MixPose::Setup {
            bone.rotation = setup;
        }
        return;
    }

    let r2 = if time >= frames[frames.len() - 1].time {
        setup + sample_rotate(frames, time)
    } else {
        wrap_degrees(setup + sample_rotate(frames, time))
    };

    let r1 = if pose == MixPose::Setup {
        setup
    } else {
        bone.rotation
    };
    let mut diff = r2 - r1;
    let total = if diff == 0.0 {
        state[0]
    } else {
        diff = wrap_degrees(diff);
        let (mut last_total, last_diff) = if first_frame {
            (0.0, diff)
        } else {
            (state[0], state[1])
        };
        let current = diff > 0.0;
        let mut dir = last_total >= 0.0;
        // Detect a cross at 0, not 180.
        if sign(last_diff) != sign(diff) && last_diff.abs() <= 90.0 {
            // A cross after a full turn is a loop.
            if last_total.abs() > 180.0 {
                last_total += 360.0 * sign(last_total);
            }
            dir = current;
        }
        let mut total = diff + last_total - last_total % 360.0;
        if dir != current {
            total += 360.0 * sign(last_total);
        }
        state[0] = total;
        total
    };
    state[1] = diff;
    bone.rotation = wrap_degrees(r1 + total * alpha);
}
