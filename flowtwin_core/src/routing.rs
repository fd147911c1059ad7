//! Exit verdicts and next-hop selection for a part leaving a station.

use crate::config::ExitPolicy;
use crate::layout::Route;
use crate::model::{ExitResult, StationConfig, StationType};

/// Where a part goes after leaving a station.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextHop {
    /// Onto the belt `from -> to`.
    Transit { from: String, to: String },
    /// Journey ends successfully.
    Complete,
    /// Journey ends as scrap.
    Scrap,
}

/// Maps a uniform sample to a station verdict. Only stations that roll a
/// verdict can produce anything but `Ok`.
pub fn roll_verdict(station_type: StationType, sample: f64, policy: &ExitPolicy) -> ExitResult {
    if !station_type.rolls_verdict() {
        return ExitResult::Ok;
    }
    if sample < policy.nok_below {
        ExitResult::Nok
    } else if sample < policy.rework_below {
        ExitResult::Rework
    } else {
        ExitResult::Ok
    }
}

/// Picks the next hop for a part leaving `station` with `result`.
///
/// `pick(n)` chooses an index in `[0, n)` among the downstream stations.
/// A downstream pick that is not on the part's route ends the journey.
pub fn next_hop<F>(station: &StationConfig, result: ExitResult, route: &Route, pick: F) -> NextHop
where
    F: FnOnce(usize) -> usize,
{
    if result == ExitResult::Nok {
        return NextHop::Scrap;
    }

    if result == ExitResult::Rework {
        if let Some(target) = station.rework_target.as_ref().filter(|t| route.contains(t)) {
            return NextHop::Transit {
                from: station.station_id.clone(),
                to: target.clone(),
            };
        }
    }

    if station.next_stations.is_empty() {
        return NextHop::Complete;
    }

    let idx = pick(station.next_stations.len()).min(station.next_stations.len() - 1);
    let next = &station.next_stations[idx];
    if route.contains(next) {
        NextHop::Transit {
            from: station.station_id.clone(),
            to: next.clone(),
        }
    } else {
        NextHop::Complete
    }
}
