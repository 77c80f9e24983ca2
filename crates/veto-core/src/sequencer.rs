//! Veto sequencer.
//!
//! Given a format identifier and the number of selections already made,
//! returns the next required action. The tables below are the entire rule of
//! who acts when; adding a format means adding a row to [`FORMATS`].

use serde::Serialize;

use crate::session::{ActingSide, Stage};

/// One entry of a format table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VetoStep {
    /// Action kind.
    pub stage: Stage,
    /// Side that must act.
    pub acting_side: ActingSide,
}

const fn step(stage: Stage, acting_side: ActingSide) -> VetoStep {
    VetoStep { stage, acting_side }
}

use ActingSide::{Any, First, Second};
use Stage::{Ban, Decider, Pick, Side};

/// Best of three. Nine steps; the map left over is the decider.
const BO3: &[VetoStep] = &[
    step(Ban, First),
    step(Ban, Second),
    step(Pick, First),
    step(Side, Second),
    step(Pick, Second),
    step(Side, First),
    step(Ban, First),
    step(Ban, Second),
    step(Pick, Second),
];

/// Best of five. Every step is operator-assignable.
const BO5: &[VetoStep] = &[
    step(Ban, Any),
    step(Ban, Any),
    step(Pick, Any),
    step(Pick, Any),
    step(Pick, Any),
    step(Pick, Any),
    step(Decider, Any),
];

/// Registered formats.
pub const FORMATS: &[(&str, &[VetoStep])] = &[("bo3", BO3), ("bo5", BO5)];

/// Step table for `format`, `None` if the format is not registered.
pub fn steps(format: &str) -> Option<&'static [VetoStep]> {
    FORMATS
        .iter()
        .find(|(id, _)| *id == format)
        .map(|(_, table)| *table)
}

/// Next required action.
///
/// `None` when the format is unknown or the draft is complete
/// (`selections_made` past the end of the table).
pub fn next_action(format: &str, selections_made: usize) -> Option<VetoStep> {
    steps(format)?.get(selections_made).copied()
}
