// ABOUTME: Availability resolution for stores and employees from weekly schedules
// ABOUTME: Pure interval math over coalesced windows; read-only, no ambient clock

// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Marcel Bookings

//! # Availability Resolver
//!
//! Computes the bookable windows of a store, optionally narrowed to one
//! employee, for a given calendar date. The result is a deterministic
//! function of the stored weekly schedules and the date argument; the
//! resolver never consults a clock and never writes.
//!
//! Windows are half-open `[start, end)` intervals. Store rows for the
//! weekday are coalesced into disjoint ordered windows; when an employee is
//! requested, their coalesced shift windows are intersected with the store's,
//! so the employee result is always a subset of the store's hours.

use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use tracing::debug;
use uuid::Uuid;

use crate::database::Database;
use crate::errors::{AppError, AppResult};
use crate::models::TimeWindow;

/// Merge overlapping and adjacent windows into a disjoint ordered set
///
/// Windows with `start >= end` carry no time and are dropped. Adjacent
/// windows (`[9,12)` + `[12,17)`) merge, since the boundary instant belongs
/// to the second one.
#[must_use]
pub fn coalesce(mut windows: Vec<TimeWindow>) -> Vec<TimeWindow> {
    windows.retain(|w| w.start < w.end);
    windows.sort_by_key(|w| (w.start, w.end));

    let mut merged: Vec<TimeWindow> = Vec::with_capacity(windows.len());
    for window in windows {
        match merged.last_mut() {
            Some(last) if window.start <= last.end => {
                if window.end > last.end {
                    last.end = window.end;
                }
            }
            _ => merged.push(window),
        }
    }
    merged
}

/// Intersect two disjoint ordered window sets
///
/// Both inputs must already be coalesced. The output is again disjoint and
/// ordered; zero-length intersections are dropped.
#[must_use]
pub fn intersect(left: &[TimeWindow], right: &[TimeWindow]) -> Vec<TimeWindow> {
    let mut result = Vec::new();
    let (mut i, mut j) = (0, 0);

    while i < left.len() && j < right.len() {
        let a = &left[i];
        let b = &right[j];

        let start = a.start.max(b.start);
        let end = a.end.min(b.end);
        if start < end {
            result.push(TimeWindow::new(start, end));
        }

        // Advance whichever window ends first
        if a.end <= b.end {
            i += 1;
        } else {
            j += 1;
        }
    }

    result
}

/// Resolves bookable windows from stored weekly schedules
#[derive(Clone)]
pub struct AvailabilityResolver {
    database: Arc<Database>,
}

impl AvailabilityResolver {
    /// Create a new resolver over the given database
    #[must_use]
    pub const fn new(database: Arc<Database>) -> Self {
        Self { database }
    }

    /// Bookable windows of a store on a date, optionally for one employee
    ///
    /// Returns an empty vector when the store (or the employee) has no
    /// schedule for that weekday: "closed" is an answer, not an error.
    ///
    /// # Errors
    ///
    /// Returns an error only when the underlying schedule queries fail.
    pub async fn resolve_windows(
        &self,
        store_id: Uuid,
        employee_id: Option<Uuid>,
        date: NaiveDate,
    ) -> AppResult<Vec<TimeWindow>> {
        // Weekday numbering matches the schedule rows: Sunday = 0
        let day_of_week = u8::try_from(date.weekday().num_days_from_sunday())
            .map_err(|_| AppError::internal("weekday out of range"))?;

        let store_rows = self
            .database
            .store_windows_for_day(store_id, day_of_week)
            .await?;
        let store_windows = coalesce(
            store_rows
                .iter()
                .map(|row| TimeWindow::new(row.opens_at, row.closes_at))
                .collect(),
        );

        let windows = if let Some(employee_id) = employee_id {
            let employee_rows = self
                .database
                .employee_windows_for_day(employee_id, store_id, day_of_week)
                .await?;
            let employee_windows = coalesce(
                employee_rows
                    .iter()
                    .map(|row| TimeWindow::new(row.starts_at, row.ends_at))
                    .collect(),
            );
            intersect(&store_windows, &employee_windows)
        } else {
            store_windows
        };

        debug!(
            store_id = %store_id,
            employee_id = ?employee_id,
            date = %date,
            window_count = windows.len(),
            "Resolved availability windows"
        );

        Ok(windows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn w(sh: u32, sm: u32, eh: u32, em: u32) -> TimeWindow {
        TimeWindow::new(t(sh, sm), t(eh, em))
    }

    #[test]
    fn test_coalesce_merges_overlapping_and_adjacent() {
        let merged = coalesce(vec![w(13, 0, 17, 0), w(9, 0, 12, 0), w(11, 0, 13, 0)]);
        assert_eq!(merged, vec![w(9, 0, 17, 0)]);

        let adjacent = coalesce(vec![w(9, 0, 12, 0), w(12, 0, 15, 0)]);
        assert_eq!(adjacent, vec![w(9, 0, 15, 0)]);
    }

    #[test]
    fn test_coalesce_keeps_disjoint_windows_ordered() {
        let merged = coalesce(vec![w(14, 0, 18, 0), w(9, 0, 12, 0)]);
        assert_eq!(merged, vec![w(9, 0, 12, 0), w(14, 0, 18, 0)]);
    }

    #[test]
    fn test_coalesce_drops_empty_windows() {
        let merged = coalesce(vec![w(9, 0, 9, 0), w(10, 0, 11, 0)]);
        assert_eq!(merged, vec![w(10, 0, 11, 0)]);
        assert!(coalesce(vec![]).is_empty());
    }

    #[test]
    fn test_intersect_clips_to_overlap() {
        let store = vec![w(9, 0, 17, 0)];
        let employee = vec![w(8, 0, 13, 0)];
        assert_eq!(intersect(&store, &employee), vec![w(9, 0, 13, 0)]);
    }

    #[test]
    fn test_intersect_spans_multiple_windows() {
        let store = vec![w(9, 0, 12, 0), w(13, 0, 17, 0)];
        let employee = vec![w(10, 0, 15, 0)];
        assert_eq!(
            intersect(&store, &employee),
            vec![w(10, 0, 12, 0), w(13, 0, 15, 0)]
        );
    }

    #[test]
    fn test_intersect_disjoint_sets_is_empty() {
        let store = vec![w(9, 0, 12, 0)];
        let employee = vec![w(13, 0, 17, 0)];
        assert!(intersect(&store, &employee).is_empty());
        assert!(intersect(&store, &[]).is_empty());
    }

    #[test]
    fn test_intersect_touching_boundaries_is_empty() {
        // [9,12) and [12,17) share only the boundary instant
        let store = vec![w(9, 0, 12, 0)];
        let employee = vec![w(12, 0, 17, 0)];
        assert!(intersect(&store, &employee).is_empty());
    }
}
