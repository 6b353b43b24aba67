//! Today / Tomorrow / Upcoming buckets.

use crate::model::Task;
use chrono::{DateTime, Days, TimeZone};
use std::cmp::Ordering;

#[derive(Debug, Default, PartialEq)]
pub struct Buckets<'a> {
    pub today: Vec<&'a Task>,
    pub tomorrow: Vec<&'a Task>,
    pub upcoming: Vec<&'a Task>,
}

impl Buckets<'_> {
    pub fn len(&self) -> usize {
        self.today.len() + self.tomorrow.len() + self.upcoming.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Last millisecond of the day `days_ahead` days after `now`, in `now`'s zone.
pub fn end_of_day<Tz: TimeZone>(now: &DateTime<Tz>, days_ahead: u64) -> Option<DateTime<Tz>> {
    let date = now.date_naive().checked_add_days(Days::new(days_ahead))?;
    let local = date.and_hms_milli_opt(23, 59, 59, 999)?;
    now.timezone().from_local_datetime(&local).latest()
}

/// Split open tasks into buckets relative to `now`.
///
/// Each bucket is ordered by due instant with ties broken by id; tasks with
/// no due date (or one that cannot be placed in the local zone) go last in
/// `upcoming`.
pub fn partition<'a, Tz: TimeZone>(
    tasks: impl IntoIterator<Item = &'a Task>,
    now: &DateTime<Tz>,
) -> Buckets<'a> {
    let tz = now.timezone();
    let mut keyed: Vec<(Option<DateTime<Tz>>, &Task)> = tasks
        .into_iter()
        .filter(|t| !t.is_completed())
        .map(|t| (t.due().and_then(|due| due.resolve(&tz)), t))
        .collect();

    keyed.sort_by(|(a_due, a), (b_due, b)| {
        let by_due = match (a_due, b_due) {
            (Some(x), Some(y)) => x.cmp(y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_due.then_with(|| a.id().cmp(b.id()))
    });

    let today_end = end_of_day(now, 0);
    let tomorrow_end = end_of_day(now, 1);

    let mut buckets = Buckets::default();
    for (due, task) in keyed {
        match due {
            Some(ref d) if today_end.as_ref().is_some_and(|end| d <= end) => buckets.today.push(task),
            Some(ref d) if tomorrow_end.as_ref().is_some_and(|end| d <= end) => {
                buckets.tomorrow.push(task)
            }
            _ => buckets.upcoming.push(task),
        }
    }
    buckets
}
