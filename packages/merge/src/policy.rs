//! US state policy actions.

use chrono::NaiveDate;
use covid_atlas_region_models::{PolicyChange, Region, sort_policy_changes};
use covid_atlas_source_models::{PolicyEvent, SourceId};
use covid_atlas_warnings::Anomaly;

use crate::{Atlas, WarningCollector, group_by};

/// Changes at or above this magnitude contribute their emoji to a day.
pub const SIGNIFICANT_SCORE: i32 = 2;

/// Attaches state policy events to state regions, then orders every
/// region's policy changes.
pub fn merge(atlas: &mut Atlas, events: &[PolicyEvent], warnings: &mut WarningCollector) {
    let credits = SourceId::StatePolicy.credits();
    let mut merged = 0_usize;

    for (state_fips, events) in group_by(events, |e| e.state_fips) {
        let Some(region) = atlas.by_fips_mut(state_fips) else {
            warnings.warn(&Anomaly::unknown("state policy FIPS", state_fips));
            continue;
        };
        region.metrics.policy.extend(events.iter().map(|e| PolicyChange {
            date: e.date,
            score: e.score,
            emoji: e.emoji.clone(),
            text: e.policy.clone(),
            credits: credits.clone(),
        }));
        region.add_credits(&credits);
        merged += events.len();
    }

    sort_all(&mut atlas.world);
    log::info!("Merged {merged} state policy events");
}

/// Sorts the policy changes of `region` and all its descendants.
pub fn sort_all(region: &mut Region) {
    region.visit_mut(&mut |r: &mut Region| sort_policy_changes(&mut r.metrics.policy));
}

/// All policy changes of one day, reduced to a single marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyPolicy<'a> {
    pub date: NaiveDate,
    /// The stronger of the day's most positive and most negative scores;
    /// zero when they cancel.
    pub score: i32,
    /// Emoji of significant changes, most severe first, without repeats.
    pub emojis: Vec<&'a str>,
    pub changes: Vec<&'a PolicyChange>,
}

/// Groups policy changes by day and reduces each day to one marker.
#[must_use]
pub fn daily_policy_summary(changes: &[PolicyChange]) -> Vec<DailyPolicy<'_>> {
    group_by(changes, |c| c.date)
        .into_iter()
        .map(|(date, mut changes)| {
            let up = changes.iter().map(|c| c.score).max().unwrap_or(0).max(0);
            let down = changes.iter().map(|c| c.score).min().unwrap_or(0).min(0);
            let score = match up.cmp(&-down) {
                std::cmp::Ordering::Greater => up,
                std::cmp::Ordering::Less => down,
                std::cmp::Ordering::Equal => 0,
            };

            changes.sort_by_key(|c| c.sort_key());
            let mut emojis: Vec<&str> = Vec::new();
            for c in &changes {
                if c.score.abs() >= SIGNIFICANT_SCORE
                    && !c.emoji.is_empty()
                    && !emojis.contains(&c.emoji.as_str())
                {
                    emojis.push(&c.emoji);
                }
            }

            DailyPolicy {
                date,
                score,
                emojis,
                changes,
            }
        })
        .collect()
}
