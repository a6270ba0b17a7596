//! Time-bucketed tallies for the timeline view.

use chrono::{DateTime, Datelike, Days, Local, TimeZone};
use std::collections::{BTreeMap, HashMap};

use crate::error::{GitWhoError, Result};
use crate::git::Commit;
use crate::tally::{rank, Combine, FinalTally, Tally, TallyMode, TallyOpts};

/// Bucket size for a time series.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    Daily,
    Monthly,
    Yearly,
}

fn local_midnight(year: i32, month: u32, day: u32) -> DateTime<Local> {
    Local
        .with_ymd_and_hms(year, month, day, 0, 0, 0)
        .earliest()
        .expect("local midnight should exist")
}

impl Resolution {
    /// Truncates a time to the start of its bucket, in local time.
    pub fn truncate(&self, t: DateTime<Local>) -> DateTime<Local> {
        match self {
            Resolution::Daily => local_midnight(t.year(), t.month(), t.day()),
            Resolution::Monthly => local_midnight(t.year(), t.month(), 1),
            Resolution::Yearly => local_midnight(t.year(), 1, 1),
        }
    }

    /// The start of the bucket after the one containing `t`.
    pub fn next(&self, t: DateTime<Local>) -> DateTime<Local> {
        let t = self.truncate(t);
        match self {
            Resolution::Daily => {
                let d = t.date_naive() + Days::new(1);
                local_midnight(d.year(), d.month(), d.day())
            }
            Resolution::Monthly => {
                if t.month() == 12 {
                    local_midnight(t.year() + 1, 1, 1)
                } else {
                    local_midnight(t.year(), t.month() + 1, 1)
                }
            }
            Resolution::Yearly => local_midnight(t.year() + 1, 1, 1),
        }
    }

    /// Formats a bucket label for the time.
    pub fn label(&self, t: DateTime<Local>) -> String {
        let t = self.truncate(t);
        match self {
            Resolution::Daily => t.format("%Y-%m-%d").to_string(),
            Resolution::Monthly => t.format("%b %Y").to_string(),
            Resolution::Yearly => t.format("%Y").to_string(),
        }
    }
}

/// Picks a resolution from the span: daily up to 60 days, monthly up to
/// five years, yearly beyond.
pub fn calc_resolution(start: DateTime<Local>, end: DateTime<Local>) -> Resolution {
    let day = 60 * 60 * 24i64;
    let span = end.signed_duration_since(start).num_seconds();

    if span > day * 365 * 5 {
        Resolution::Yearly
    } else if span > day * 60 {
        Resolution::Monthly
    } else {
        Resolution::Daily
    }
}

#[derive(Clone, Debug)]
pub struct TimeBucket {
    pub name: String,
    pub time: DateTime<Local>,
    /// Winning author's tally, set by `rank`.
    pub tally: Option<FinalTally>,
    /// Overall tally for all authors, set by `rank`.
    pub total_tally: Option<FinalTally>,
    tallies: HashMap<String, Tally>,
}

impl TimeBucket {
    fn new(name: String, time: DateTime<Local>) -> Self {
        TimeBucket {
            name,
            time,
            tally: None,
            total_tally: None,
            tallies: HashMap::new(),
        }
    }

    fn metric(tally: &FinalTally, mode: TallyMode) -> u64 {
        match mode {
            TallyMode::Commits => tally.commits as u64,
            TallyMode::Files => tally.file_count as u64,
            TallyMode::Lines => tally.lines_added + tally.lines_removed,
            _ => panic!("unsupported tally mode for timeline"),
        }
    }

    /// The winning author's metric, zero for an empty bucket.
    pub fn value(&self, mode: TallyMode) -> u64 {
        self.tally.as_ref().map_or(0, |t| Self::metric(t, mode))
    }

    /// The all-author metric, zero for an empty bucket.
    pub fn total_value(&self, mode: TallyMode) -> u64 {
        self.total_tally.as_ref().map_or(0, |t| Self::metric(t, mode))
    }

    /// Picks the winning author and computes the bucket total.
    pub fn rank(mut self, mode: TallyMode) -> TimeBucket {
        if !self.tallies.is_empty() {
            let mut running = Tally::default();
            for tally in self.tallies.values() {
                running = running.combine(tally.clone());
            }

            self.tally = rank(std::mem::take(&mut self.tallies), mode).into_iter().next();
            self.total_tally = Some(running.finalize());
        }

        self
    }

    #[cfg(test)]
    pub(crate) fn with_tallies(
        name: &str,
        time: DateTime<Local>,
        tallies: HashMap<String, Tally>,
    ) -> Self {
        TimeBucket {
            name: name.to_string(),
            time,
            tally: None,
            total_tally: None,
            tallies,
        }
    }

    #[cfg(test)]
    pub(crate) fn tallies(&self) -> &HashMap<String, Tally> {
        &self.tallies
    }
}

impl Combine for TimeBucket {
    fn combine(self, other: TimeBucket) -> TimeBucket {
        assert_eq!(
            self.time.timestamp(),
            other.time.timestamp(),
            "cannot combine buckets whose times do not match"
        );

        let mut merged = self;
        for (key, tally) in other.tallies {
            let combined = match merged.tallies.remove(&key) {
                Some(existing) => existing.combine(tally),
                None => tally,
            };
            merged.tallies.insert(key, combined);
        }

        merged
    }
}

/// An ordered list of time buckets, ascending by time.
#[derive(Clone, Debug, Default)]
pub struct TimeSeries(pub Vec<TimeBucket>);

impl Combine for TimeSeries {
    fn combine(self, other: TimeSeries) -> TimeSeries {
        let mut buckets: BTreeMap<i64, TimeBucket> = BTreeMap::new();

        for bucket in self.0.into_iter().chain(other.0) {
            let combined = match buckets.remove(&bucket.time.timestamp()) {
                Some(existing) => existing.combine(bucket),
                None => bucket,
            };
            buckets.insert(combined.time.timestamp(), combined);
        }

        TimeSeries(buckets.into_values().collect())
    }
}

/// Tallies commits into a (possibly sparse-input, dense-output) series of
/// daily buckets.
pub fn tally_commits_by_date(
    commits: impl Iterator<Item = Result<Commit>>,
    opts: &TallyOpts,
) -> Result<TimeSeries> {
    if matches!(opts.mode, TallyMode::LastModified | TallyMode::FirstModified) {
        return Err(GitWhoError::Input(
            "mode not implemented for timeline".to_string(),
        ));
    }

    let resolution = Resolution::Daily;
    let mut buckets: BTreeMap<i64, TimeBucket> = BTreeMap::new();
    let mut min_time: Option<DateTime<Local>> = None;
    let mut max_time: Option<DateTime<Local>> = None;

    for commit in commits {
        let commit = commit
            .map_err(|e| GitWhoError::Parse(format!("error iterating commits: {e}")))?;

        let bucketed = resolution.truncate(commit.date.with_timezone(&Local));
        min_time = Some(min_time.map_or(bucketed, |t| t.min(bucketed)));
        max_time = Some(max_time.map_or(bucketed, |t| t.max(bucketed)));

        if commit.is_merge && !opts.count_merges {
            continue;
        }

        let bucket = buckets
            .entry(bucketed.timestamp())
            .or_insert_with(|| TimeBucket::new(resolution.label(bucketed), bucketed));

        let tally = bucket.tallies.entry(opts.key.of(&commit)).or_default();
        tally.observe(&commit);
        tally.num_tallied += 1;

        if !commit.is_merge {
            for diff in &commit.file_diffs {
                tally.added += diff.lines_added;
                tally.removed += diff.lines_removed;
                tally.fileset.insert(diff.path.clone());
            }
        }
    }

    // Densify: every day between the first and last commit gets a bucket.
    let (Some(min_time), Some(max_time)) = (min_time, max_time) else {
        return Ok(TimeSeries::default());
    };

    let mut series = Vec::new();
    let mut t = min_time;
    while t <= max_time {
        let bucket = buckets
            .remove(&t.timestamp())
            .unwrap_or_else(|| TimeBucket::new(resolution.label(t), t));
        series.push(bucket);
        t = resolution.next(t);
    }

    Ok(TimeSeries(series))
}

/// Remaps a series onto a coarser resolution, producing a dense series
/// running through `end`. The input must be ascending.
pub fn rebucket(series: TimeSeries, resolution: Resolution, end: DateTime<Local>) -> TimeSeries {
    let TimeSeries(buckets) = series;
    if buckets.is_empty() {
        return TimeSeries(buckets);
    }

    let mut rebuckets = Vec::new();
    let mut t = resolution.truncate(buckets[0].time);
    while t <= end {
        rebuckets.push(TimeBucket::new(resolution.label(t), t));
        t = resolution.next(t);
    }

    let mut i = 0;
    for mut bucket in buckets {
        let rebucketed_time = resolution.truncate(bucket.time);
        while i + 1 < rebuckets.len()
            && rebucketed_time.timestamp() > rebuckets[i].time.timestamp()
        {
            i += 1;
        }

        bucket.time = rebuckets[i].time;
        bucket.name = rebuckets[i].name.clone();
        let slot = std::mem::replace(
            &mut rebuckets[i],
            TimeBucket::new(String::new(), rebucketed_time),
        );
        rebuckets[i] = slot.combine(bucket);
    }

    TimeSeries(rebuckets)
}

/// Buckets commits by date, sizing buckets by the span between the first
/// commit and `end` (or the last commit when `end` is `None`).
pub fn tally_commits_timeline(
    commits: impl Iterator<Item = Result<Commit>>,
    opts: &TallyOpts,
    end: Option<DateTime<Local>>,
) -> Result<TimeSeries> {
    let series = tally_commits_by_date(commits, opts)?;
    Ok(rebucket_timeline(series, end))
}

/// Rebuckets a daily series for timeline display.
pub fn rebucket_timeline(series: TimeSeries, end: Option<DateTime<Local>>) -> TimeSeries {
    let Some(last) = series.0.last() else {
        return series;
    };

    let end = end.unwrap_or(last.time);
    let resolution = calc_resolution(series.0[0].time, end);
    rebucket(series, resolution, end)
}
