// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Linear attack/decay/sustain/release envelope.

use serde::{Deserialize, Serialize};

/// Default attack time in seconds.
pub const DEFAULT_ATTACK_SECS: f32 = 0.1;

/// Default decay time in seconds.
pub const DEFAULT_DECAY_SECS: f32 = 0.1;

/// Default sustain level.
pub const DEFAULT_SUSTAIN_LEVEL: f32 = 1.0;

/// Default release time in seconds.
pub const DEFAULT_RELEASE_SECS: f32 = 0.1;

/// Envelope shape. Times are in seconds, sustain is a level between 0 and 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdsrParameters {
    #[serde(default = "default_attack")]
    pub attack: f32,
    #[serde(default = "default_decay")]
    pub decay: f32,
    #[serde(default = "default_sustain")]
    pub sustain: f32,
    #[serde(default = "default_release")]
    pub release: f32,
}

fn default_attack() -> f32 {
    DEFAULT_ATTACK_SECS
}

fn default_decay() -> f32 {
    DEFAULT_DECAY_SECS
}

fn default_sustain() -> f32 {
    DEFAULT_SUSTAIN_LEVEL
}

fn default_release() -> f32 {
    DEFAULT_RELEASE_SECS
}

impl AdsrParameters {
    pub fn new(attack: f32, decay: f32, sustain: f32, release: f32) -> Self {
        Self {
            attack,
            decay,
            sustain,
            release,
        }
    }

    /// An envelope that opens instantly and holds full level until release.
    pub fn flat() -> Self {
        Self::new(0.0, 0.0, 1.0, 0.0)
    }
}

impl Default for AdsrParameters {
    fn default() -> Self {
        Self::new(
            DEFAULT_ATTACK_SECS,
            DEFAULT_DECAY_SECS,
            DEFAULT_SUSTAIN_LEVEL,
            DEFAULT_RELEASE_SECS,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeStage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// Per-voice envelope generator.
///
/// `set_parameters` and `set_sample_rate` must be called before `note_on`.
#[derive(Debug, Clone)]
pub struct Adsr {
    stage: EnvelopeStage,
    level: f32,
    parameters: AdsrParameters,
    sample_rate: f64,
    // Per-sample increments. Zero means the stage is skipped.
    attack_rate: f32,
    decay_rate: f32,
    release_rate: f32,
}

impl Adsr {
    pub fn new() -> Self {
        let mut adsr = Self {
            stage: EnvelopeStage::Idle,
            level: 0.0,
            parameters: AdsrParameters::default(),
            sample_rate: 44100.0,
            attack_rate: 0.0,
            decay_rate: 0.0,
            release_rate: 0.0,
        };
        adsr.recalculate_rates();
        adsr
    }

    pub fn set_parameters(&mut self, parameters: AdsrParameters) {
        self.parameters = AdsrParameters {
            attack: parameters.attack.max(0.0),
            decay: parameters.decay.max(0.0),
            sustain: parameters.sustain.clamp(0.0, 1.0),
            release: parameters.release.max(0.0),
        };
        self.recalculate_rates();
    }

    pub fn parameters(&self) -> AdsrParameters {
        self.parameters
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        if sample_rate > 0.0 {
            self.sample_rate = sample_rate;
            self.recalculate_rates();
        }
    }

    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    /// The level most recently returned by `next_sample`.
    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn is_active(&self) -> bool {
        self.stage != EnvelopeStage::Idle
    }

    /// Hard reset to silence.
    pub fn reset(&mut self) {
        self.level = 0.0;
        self.stage = EnvelopeStage::Idle;
    }

    /// Starts the attack stage from wherever the level currently is.
    pub fn note_on(&mut self) {
        if self.attack_rate > 0.0 {
            self.stage = EnvelopeStage::Attack;
        } else if self.decay_rate > 0.0 {
            self.level = 1.0;
            self.stage = EnvelopeStage::Decay;
        } else {
            self.level = self.parameters.sustain;
            self.stage = EnvelopeStage::Sustain;
        }
    }

    /// Moves to the release stage, ramping from the current level to zero.
    pub fn note_off(&mut self) {
        if self.stage == EnvelopeStage::Idle {
            return;
        }

        if self.parameters.release > 0.0 {
            self.release_rate =
                (self.level as f64 / (self.parameters.release as f64 * self.sample_rate)) as f32;
            self.stage = EnvelopeStage::Release;
        } else {
            self.reset();
        }
    }

    /// Advances one sample and returns the gain multiplier.
    #[inline]
    pub fn next_sample(&mut self) -> f32 {
        match self.stage {
            EnvelopeStage::Idle => return 0.0,
            EnvelopeStage::Attack => {
                self.level += self.attack_rate;
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.advance_stage();
                }
            }
            EnvelopeStage::Decay => {
                self.level -= self.decay_rate;
                if self.level <= self.parameters.sustain {
                    self.level = self.parameters.sustain;
                    self.advance_stage();
                }
            }
            EnvelopeStage::Sustain => {
                self.level = self.parameters.sustain;
            }
            EnvelopeStage::Release => {
                self.level -= self.release_rate;
                if self.level <= 0.0 {
                    self.advance_stage();
                }
            }
        }

        self.level.clamp(0.0, 1.0)
    }

    fn advance_stage(&mut self) {
        match self.stage {
            EnvelopeStage::Attack => {
                self.stage = if self.decay_rate > 0.0 {
                    EnvelopeStage::Decay
                } else {
                    EnvelopeStage::Sustain
                };
            }
            EnvelopeStage::Decay => self.stage = EnvelopeStage::Sustain,
            EnvelopeStage::Release => self.reset(),
            EnvelopeStage::Idle | EnvelopeStage::Sustain => {}
        }
    }

    fn recalculate_rates(&mut self) {
        let rate = |distance: f32, seconds: f32, sample_rate: f64| -> f32 {
            if seconds > 0.0 {
                (distance as f64 / (seconds as f64 * sample_rate)) as f32
            } else {
                0.0
            }
        };

        let p = self.parameters;
        self.attack_rate = rate(1.0, p.attack, self.sample_rate);
        self.decay_rate = rate(1.0 - p.sustain, p.decay, self.sample_rate);
        self.release_rate = rate(p.sustain, p.release, self.sample_rate);

        // A stage whose time was just zeroed must not stall.
        match self.stage {
            EnvelopeStage::Attack if self.attack_rate <= 0.0 => {
                self.level = 1.0;
                self.advance_stage();
            }
            EnvelopeStage::Decay
                if self.decay_rate <= 0.0 || self.level <= self.parameters.sustain =>
            {
                self.level = self.parameters.sustain;
                self.advance_stage();
            }
            EnvelopeStage::Release if self.release_rate <= 0.0 => self.reset(),
            _ => {}
        }
    }
}

impl Default for Adsr {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: f64 = 1000.0;

    fn envelope(parameters: AdsrParameters) -> Adsr {
        let mut adsr = Adsr::new();
        adsr.set_sample_rate(RATE);
        adsr.set_parameters(parameters);
        adsr
    }

    #[test]
    fn test_idle_is_silent() {
        let mut adsr = envelope(AdsrParameters::default());
        assert!(!adsr.is_active());
        for _ in 0..10 {
            assert_eq!(adsr.next_sample(), 0.0);
        }
    }

    #[test]
    fn test_stage_shapes() {
        // 10 samples attack, 10 samples decay to 0.5, release over 10 samples.
        let mut adsr = envelope(AdsrParameters::new(0.01, 0.01, 0.5, 0.01));
        adsr.note_on();

        let mut previous = 0.0;
        while adsr.stage() == EnvelopeStage::Attack {
            let value = adsr.next_sample();
            assert!(value >= previous, "attack must not fall");
            previous = value;
        }
        assert!((previous - 1.0).abs() < 1e-6);

        while adsr.stage() == EnvelopeStage::Decay {
            let value = adsr.next_sample();
            assert!(value <= previous, "decay must not rise");
            previous = value;
        }
        assert_eq!(adsr.stage(), EnvelopeStage::Sustain);

        for _ in 0..50 {
            assert_eq!(adsr.next_sample(), 0.5);
        }

        adsr.note_off();
        previous = 0.5;
        let mut samples = 0;
        while adsr.is_active() {
            let value = adsr.next_sample();
            assert!(value <= previous, "release must not rise");
            assert!((0.0..=1.0).contains(&value));
            previous = value;
            samples += 1;
        }
        assert!(samples <= 11, "release took {} samples", samples);
        assert_eq!(adsr.next_sample(), 0.0);
    }

    #[test]
    fn test_attack_ramp_is_linear() {
        let mut adsr = envelope(AdsrParameters::new(0.1, 0.1, 1.0, 0.1));
        adsr.note_on();
        // 100 samples of attack at 1kHz.
        for i in 1..=100 {
            let expected = i as f32 / 100.0;
            assert!((adsr.next_sample() - expected).abs() < 1e-4);
        }
        assert_eq!(adsr.next_sample(), 1.0);
        assert_eq!(adsr.stage(), EnvelopeStage::Sustain);
    }

    #[test]
    fn test_flat_envelope_starts_at_full_level() {
        let mut adsr = envelope(AdsrParameters::flat());
        adsr.note_on();
        assert_eq!(adsr.stage(), EnvelopeStage::Sustain);
        assert_eq!(adsr.next_sample(), 1.0);
    }

    #[test]
    fn test_retrigger_continues_from_current_level() {
        let mut adsr = envelope(AdsrParameters::new(0.1, 0.0, 1.0, 0.1));
        adsr.note_on();
        for _ in 0..50 {
            adsr.next_sample();
        }
        adsr.note_off();
        for _ in 0..10 {
            adsr.next_sample();
        }
        let before = adsr.level();
        assert!(before > 0.0);

        adsr.note_on();
        let after = adsr.next_sample();
        assert!(after >= before);
        assert!(after - before <= 0.0101, "jump of {}", after - before);
    }

    #[test]
    fn test_zero_release_resets_immediately() {
        let mut adsr = envelope(AdsrParameters::new(0.0, 0.0, 0.8, 0.0));
        adsr.note_on();
        assert_eq!(adsr.next_sample(), 0.8);
        adsr.note_off();
        assert!(!adsr.is_active());
        assert_eq!(adsr.next_sample(), 0.0);
    }

    #[test]
    fn test_note_off_while_idle_stays_idle() {
        let mut adsr = envelope(AdsrParameters::default());
        adsr.note_off();
        assert_eq!(adsr.stage(), EnvelopeStage::Idle);
    }

    #[test]
    fn test_parameters_are_sanitised() {
        let adsr = envelope(AdsrParameters::new(-1.0, -2.0, 3.0, -0.5));
        let p = adsr.parameters();
        assert_eq!(p.attack, 0.0);
        assert_eq!(p.decay, 0.0);
        assert_eq!(p.sustain, 1.0);
        assert_eq!(p.release, 0.0);
    }
}
