//! The music state machine (§4.I): fade-in, fade-out, switch-with-gap,
//! and crossfade, driven by a per-tick `advance(dt)`.
//!
//! Modeled as an explicit tagged variant rather than nested switches, per
//! the design notes. `Paused` only stores the state tag it interrupted —
//! never the scalar timer/fade fields, which the caller simply stops
//! advancing while paused and resumes unchanged.

/// `x^2 * (3 - 2x)`, the cubic Hermite ease used for every fade ramp.
pub fn smoothstep(x: f32) -> f32 {
    let x = x.clamp(0.0, 1.0);
    x * x * (3.0 - 2.0 * x)
}

#[derive(Debug, Clone, PartialEq)]
pub enum MusicState {
    None,
    Playing,
    FadeIn,
    FadeOut,
    SwitchTo0,
    SwitchTo1,
    Crossfade,
    Paused(Box<MusicState>),
}

/// What the caller must do to the instance pool in response to an
/// `advance()` call. `MusicMachine` itself only knows about scalar
/// volumes; it has no notion of instances, ids, or the pool.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MusicEvent {
    None,
    /// Fade-out finished: deactivate `music_playing` and go idle.
    FadeOutComplete,
    /// First half of a switch finished: deactivate `music_playing`,
    /// unpause `music_next`, and start the fade-in half.
    SwitchGapComplete,
    /// Fade-in / crossfade / switch-in finished: `music_playing` becomes
    /// whatever `music_next` was, and `music_next` is cleared.
    SwitchOrCrossfadeComplete,
}

#[derive(Debug, Clone)]
pub struct MusicMachine {
    pub state: MusicState,
    t: f32,
    fade: f32,
    fade2: f32,
    fade_start_volume: f32,
}

impl Default for MusicMachine {
    fn default() -> Self {
        Self {
            state: MusicState::None,
            t: 0.0,
            fade: 0.0,
            fade2: 0.0,
            fade_start_volume: 0.0,
        }
    }
}

impl MusicMachine {
    pub fn is_paused(&self) -> bool {
        matches!(self.state, MusicState::Paused(_))
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, MusicState::None)
    }

    /// Begin playing with a fade-in from silence. `current_volume` is
    /// whatever `music_playing.volume` already is (normally 0 on a fresh
    /// instance); zero-duration fades land on `Playing` immediately.
    pub fn start_fade_in(&mut self, fade: f32, current_volume: f32) {
        self.t = 0.0;
        self.fade = fade;
        self.fade_start_volume = current_volume;
        self.state = if fade <= 0.0 {
            MusicState::Playing
        } else {
            MusicState::FadeIn
        };
    }

    pub fn start_fade_out(&mut self, fade: f32, current_volume: f32) -> MusicEvent {
        self.t = 0.0;
        self.fade = fade;
        self.fade_start_volume = current_volume;
        if fade <= 0.0 {
            self.state = MusicState::None;
            MusicEvent::FadeOutComplete
        } else {
            self.state = MusicState::FadeOut;
            MusicEvent::None
        }
    }

    pub fn start_switch(&mut self, fade_out: f32, fade_in: f32, current_volume: f32) -> MusicEvent {
        self.t = 0.0;
        self.fade = fade_out;
        self.fade2 = fade_in;
        self.fade_start_volume = current_volume;
        if fade_out <= 0.0 {
            self.t = 0.0;
            self.fade = fade_in;
            if fade_in <= 0.0 {
                self.state = MusicState::Playing;
                MusicEvent::SwitchOrCrossfadeComplete
            } else {
                self.state = MusicState::SwitchTo1;
                MusicEvent::SwitchGapComplete
            }
        } else {
            self.state = MusicState::SwitchTo0;
            MusicEvent::None
        }
    }

    pub fn start_crossfade(&mut self, fade: f32, current_volume: f32) -> MusicEvent {
        self.t = 0.0;
        self.fade = fade;
        self.fade_start_volume = current_volume;
        if fade <= 0.0 {
            self.state = MusicState::Playing;
            MusicEvent::SwitchOrCrossfadeComplete
        } else {
            self.state = MusicState::Crossfade;
            MusicEvent::None
        }
    }

    pub fn pause(&mut self) {
        if !self.is_paused() {
            self.state = MusicState::Paused(Box::new(self.state.clone()));
        }
    }

    /// Restore whatever state was interrupted by `pause()`.
    pub fn resume(&mut self) {
        if let MusicState::Paused(inner) = &self.state {
            self.state = (**inner).clone();
        }
    }

    pub fn stop_immediately(&mut self) {
        self.state = MusicState::None;
        self.t = 0.0;
    }

    /// Advance the machine by `dt` seconds, writing the new `playing`/
    /// `next` instance volumes (the caller owns those instances) and
    /// returning whatever pool-level action must follow.
    pub fn advance(&mut self, dt: f32, music_volume: f32, playing_volume: &mut f32, next_volume: &mut f32) -> MusicEvent {
        match &self.state {
            MusicState::None | MusicState::Playing | MusicState::Paused(_) => MusicEvent::None,
            MusicState::FadeIn => {
                self.t += dt;
                let s = smoothstep(self.t / self.fade.max(f32::EPSILON));
                *playing_volume = music_volume * s;
                if self.t >= self.fade {
                    *playing_volume = music_volume;
                    self.state = MusicState::Playing;
                }
                MusicEvent::None
            }
            MusicState::FadeOut => {
                self.t += dt;
                let s = smoothstep(self.t / self.fade.max(f32::EPSILON));
                *playing_volume = self.fade_start_volume * (1.0 - s);
                if self.t >= self.fade {
                    self.state = MusicState::None;
                    MusicEvent::FadeOutComplete
                } else {
                    MusicEvent::None
                }
            }
            MusicState::SwitchTo0 => {
                self.t += dt;
                let s = smoothstep(self.t / self.fade.max(f32::EPSILON));
                *playing_volume = self.fade_start_volume * (1.0 - s);
                if self.t >= self.fade {
                    self.t = 0.0;
                    self.fade = self.fade2;
                    self.state = MusicState::SwitchTo1;
                    MusicEvent::SwitchGapComplete
                } else {
                    MusicEvent::None
                }
            }
            MusicState::SwitchTo1 => {
                self.t += dt;
                let s = smoothstep(self.t / self.fade.max(f32::EPSILON));
                *next_volume = music_volume * s;
                if self.t >= self.fade {
                    *next_volume = music_volume;
                    self.state = MusicState::Playing;
                    MusicEvent::SwitchOrCrossfadeComplete
                } else {
                    MusicEvent::None
                }
            }
            MusicState::Crossfade => {
                self.t += dt;
                let s = smoothstep(self.t / self.fade.max(f32::EPSILON));
                *playing_volume = self.fade_start_volume * (1.0 - s);
                *next_volume = music_volume * s;
                if self.t >= self.fade {
                    *next_volume = music_volume;
                    self.state = MusicState::Playing;
                    MusicEvent::SwitchOrCrossfadeComplete
                } else {
                    MusicEvent::None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fade_in_reaches_target_volume() {
        let mut m = MusicMachine::default();
        m.start_fade_in(1.0, 0.0);
        let (mut pv, mut nv) = (0.0f32, 0.0f32);
        for _ in 0..10 {
            m.advance(0.1, 1.0, &mut pv, &mut nv);
        }
        assert!((pv - 1.0).abs() < 1e-4);
        assert_eq!(m.state, MusicState::Playing);
    }

    #[test]
    fn zero_duration_fade_transitions_immediately() {
        let mut m = MusicMachine::default();
        m.start_fade_in(0.0, 0.0);
        assert_eq!(m.state, MusicState::Playing);
    }

    #[test]
    fn switch_moves_through_both_phases() {
        let mut m = MusicMachine::default();
        let ev = m.start_switch(0.2, 0.3, 0.5);
        assert_eq!(ev, MusicEvent::None);
        let (mut pv, mut nv) = (0.5f32, 0.0f32);
        let mut gap_seen = false;
        for _ in 0..3 {
            let ev = m.advance(0.1, 1.0, &mut pv, &mut nv);
            if ev == MusicEvent::SwitchGapComplete {
                gap_seen = true;
            }
        }
        assert!(gap_seen);
        assert_eq!(m.state, MusicState::SwitchTo1);
        for _ in 0..5 {
            m.advance(0.1, 1.0, &mut pv, &mut nv);
        }
        assert_eq!(m.state, MusicState::Playing);
        assert!((nv - 1.0).abs() < 1e-4);
    }

    #[test]
    fn zero_duration_switch_collapses_straight_to_complete() {
        let mut m = MusicMachine::default();
        let ev = m.start_switch(0.0, 0.0, 0.5);
        assert_eq!(ev, MusicEvent::SwitchOrCrossfadeComplete);
        assert_eq!(m.state, MusicState::Playing);
    }

    #[test]
    fn switch_with_zero_gap_but_nonzero_fade_in_reports_gap_then_completes() {
        let mut m = MusicMachine::default();
        let ev = m.start_switch(0.0, 0.3, 0.5);
        assert_eq!(ev, MusicEvent::SwitchGapComplete);
        assert_eq!(m.state, MusicState::SwitchTo1);
    }

    #[test]
    fn zero_duration_crossfade_completes_immediately() {
        let mut m = MusicMachine::default();
        let ev = m.start_crossfade(0.0, 0.5);
        assert_eq!(ev, MusicEvent::SwitchOrCrossfadeComplete);
        assert_eq!(m.state, MusicState::Playing);
    }

    #[test]
    fn nonzero_crossfade_defers_completion() {
        let mut m = MusicMachine::default();
        let ev = m.start_crossfade(0.5, 0.5);
        assert_eq!(ev, MusicEvent::None);
        assert_eq!(m.state, MusicState::Crossfade);
    }

    #[test]
    fn pause_resume_preserves_state_tag_only() {
        let mut m = MusicMachine::default();
        m.start_fade_in(1.0, 0.0);
        let (mut pv, mut nv) = (0.0f32, 0.0f32);
        m.advance(0.3, 1.0, &mut pv, &mut nv);
        m.pause();
        assert!(m.is_paused());
        // advancing while paused is a no-op
        let before = pv;
        m.advance(10.0, 1.0, &mut pv, &mut nv);
        assert_eq!(pv, before);
        m.resume();
        assert_eq!(m.state, MusicState::FadeIn);
    }
}
