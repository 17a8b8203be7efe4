//! Session-to-grid explosion.

use crate::stage::Stage;
use crate::timegrid::{base_step, round_to_step};

use super::types::{PowerSample, Session};

/// Spreads a session's constant rate across the 5-minute grid.
///
/// The range runs from the rounded start to the rounded finish, inclusive at
/// both ends, so a session inside a single grid cell still yields one sample.
/// Each sample carries `true_peak_power_w`: a rate held flat over the span,
/// since only cumulative energy and duration are recorded.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionExploder;

impl SessionExploder {
    pub fn explode(&self, session: &Session) -> Vec<PowerSample> {
        let start = round_to_step(session.start_charge_time);
        let finish = round_to_step(session.finish_charge_time).max(start);
        let step = base_step();

        let mut samples = Vec::new();
        let mut t = start;
        while t <= finish {
            samples.push(PowerSample {
                timestamp: t,
                power_w: session.true_peak_power_w,
            });
            t += step;
        }
        samples
    }
}

impl<'a> Stage<&'a Session> for SessionExploder {
    type Output = Vec<PowerSample>;

    fn apply(&self, input: &'a Session) -> Self::Output {
        self.explode(input)
    }
}
