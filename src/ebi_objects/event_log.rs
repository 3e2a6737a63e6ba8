use anyhow::{Context, Error, Result, anyhow};
use chrono::{DateTime, FixedOffset, TimeDelta};
use rand::{Rng, seq::SliceRandom};
use serde::{Deserialize, Serialize};
use std::{
    io::{self, BufRead},
    str::FromStr,
};

use crate::{
    ebi_framework::{
        activity_key::{Activity, ActivityKey, ActivityKeyTranslator},
        exportable::Exportable,
        importable::Importable,
        infoable::Infoable,
    },
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimedEvent {
    pub activity: Activity,
    pub timestamp: DateTime<FixedOffset>,
}

pub type TimedTrace = Vec<TimedEvent>;

/// An event as it is stored in a file; other attributes are ignored.
#[derive(Serialize, Deserialize)]
struct EventRecord {
    #[serde(rename = "concept:name")]
    activity: String,
    #[serde(rename = "time:timestamp")]
    timestamp: DateTime<FixedOffset>,
}

/// The time from `from` to `to` in seconds, negative if `to` comes first.
pub fn seconds_between(from: &DateTime<FixedOffset>, to: &DateTime<FixedOffset>) -> f64 {
    let delta = to.signed_duration_since(from);
    match delta.num_microseconds() {
        Some(microseconds) => microseconds as f64 / 1e6,
        None => delta.num_milliseconds() as f64 / 1e3,
    }
}

/// A duration of (possibly fractional) seconds, rounded to microseconds.
pub fn seconds_to_delta(seconds: f64) -> TimeDelta {
    TimeDelta::microseconds((seconds * 1e6).round() as i64)
}

/// An event log in which every event has an activity and a timestamp.
/// Traces are kept in insertion order, events in the order in which they were recorded.
#[derive(Clone, Debug, Default)]
pub struct EventLog {
    activity_key: ActivityKey,
    traces: Vec<TimedTrace>,
}

impl EventLog {
    pub fn new(activity_key: ActivityKey) -> Self {
        Self {
            activity_key,
            traces: vec![],
        }
    }

    pub fn get_activity_key(&self) -> &ActivityKey {
        &self.activity_key
    }

    pub fn get_activity_key_mut(&mut self) -> &mut ActivityKey {
        &mut self.activity_key
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    pub fn get_trace(&self, trace_index: usize) -> Option<&TimedTrace> {
        self.traces.get(trace_index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TimedTrace> {
        self.traces.iter()
    }

    pub fn push(&mut self, trace: TimedTrace) {
        self.traces.push(trace);
    }

    pub fn get_number_of_events(&self) -> usize {
        self.traces.iter().map(|trace| trace.len()).sum()
    }

    /// Returns the sequence of activities of the trace, without timestamps.
    pub fn get_activity_trace(&self, trace_index: usize) -> Option<Vec<Activity>> {
        self.traces
            .get(trace_index)
            .map(|trace| trace.iter().map(|event| event.activity).collect())
    }

    /// Adds a trace of (label, timestamp) pairs, registering the labels.
    pub fn push_labelled_trace(&mut self, trace: Vec<(&str, DateTime<FixedOffset>)>) {
        let trace = trace
            .into_iter()
            .map(|(label, timestamp)| TimedEvent {
                activity: self.activity_key.process_activity(label),
                timestamp,
            })
            .collect();
        self.traces.push(trace);
    }

    /// Returns the timestamp of the first event of the first non-empty trace.
    pub fn get_first_timestamp(&self) -> Option<DateTime<FixedOffset>> {
        self.traces
            .iter()
            .find_map(|trace| trace.first())
            .map(|event| event.timestamp)
    }

    /// Translates all timestamps by the same amount.
    pub fn shift_timestamps(&mut self, delta: TimeDelta) -> Result<()> {
        for trace in self.traces.iter_mut() {
            for event in trace.iter_mut() {
                event.timestamp = event
                    .timestamp
                    .checked_add_signed(delta)
                    .ok_or_else(|| anyhow!("timestamp {} cannot be shifted by {}", event.timestamp, delta))?;
            }
        }
        Ok(())
    }

    /// Shifts all timestamps such that the first event of the log happens at `reference`.
    /// An empty log is left untouched.
    pub fn align_start_to(&mut self, reference: DateTime<FixedOffset>) -> Result<()> {
        if let Some(first) = self.get_first_timestamp() {
            self.shift_timestamps(reference.signed_duration_since(first))
                .context("aligning the start of the log")?;
        }
        Ok(())
    }

    /// Makes the log use the given activity key, so that its activities can be compared with a model.
    pub fn translate_using_activity_key(&mut self, to_activity_key: &mut ActivityKey) {
        let translator = ActivityKeyTranslator::new(&self.activity_key, to_activity_key);
        self.traces.iter_mut().for_each(|trace| {
            trace
                .iter_mut()
                .for_each(|event| event.activity = translator.translate_activity(&event.activity))
        });
        self.activity_key = to_activity_key.clone();
    }

    /// Randomly divides the traces over a train and a test log; `train_fraction` of the traces
    /// (rounded down) go to the train log.
    pub fn split<R: Rng + ?Sized>(&self, train_fraction: f64, rng: &mut R) -> Result<(Self, Self)> {
        if !(0.0..=1.0).contains(&train_fraction) {
            return Err(anyhow!(
                "train fraction should be between 0 and 1, but is {}",
                train_fraction
            ));
        }

        let mut indices: Vec<usize> = (0..self.len()).collect();
        indices.shuffle(rng);
        let train_size = (train_fraction * self.len() as f64).floor() as usize;
        let (train_indices, test_indices) = indices.split_at(train_size);

        //keep the original order of the traces within each part
        let mut train_indices = train_indices.to_vec();
        train_indices.sort_unstable();
        let mut test_indices = test_indices.to_vec();
        test_indices.sort_unstable();

        let mut train = Self::new(self.activity_key.clone());
        train_indices
            .into_iter()
            .for_each(|i| train.push(self.traces[i].clone()));
        let mut test = Self::new(self.activity_key.clone());
        test_indices
            .into_iter()
            .for_each(|i| test.push(self.traces[i].clone()));
        Ok((train, test))
    }

    fn to_records(&self) -> Vec<Vec<EventRecord>> {
        self.traces
            .iter()
            .map(|trace| {
                trace
                    .iter()
                    .map(|event| EventRecord {
                        activity: self
                            .activity_key
                            .get_activity_label(&event.activity)
                            .to_string(),
                        timestamp: event.timestamp,
                    })
                    .collect()
            })
            .collect()
    }
}

impl<'a> IntoIterator for &'a EventLog {
    type Item = &'a TimedTrace;
    type IntoIter = std::slice::Iter<'a, TimedTrace>;

    fn into_iter(self) -> Self::IntoIter {
        self.traces.iter()
    }
}

impl Importable for EventLog {
    fn import(reader: &mut dyn BufRead) -> Result<Self> {
        let records: Vec<Vec<EventRecord>> = serde_json::from_reader(reader)
            .context("the event log should be a list of traces, each a list of events")?;

        let mut result = Self::new(ActivityKey::new());
        for trace in records {
            let trace = trace
                .into_iter()
                .map(|record| TimedEvent {
                    activity: result.activity_key.process_activity(&record.activity),
                    timestamp: record.timestamp,
                })
                .collect();
            result.traces.push(trace);
        }

        Ok(result)
    }
}

impl FromStr for EventLog {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut reader = io::Cursor::new(s);
        Self::import(&mut reader)
    }
}

impl Exportable for EventLog {
    fn export(&self, f: &mut dyn std::io::Write) -> Result<()> {
        serde_json::to_writer_pretty(&mut *f, &self.to_records())?;
        Ok(writeln!(f)?)
    }
}

impl Infoable for EventLog {
    fn info(&self, f: &mut impl std::io::Write) -> Result<()> {
        writeln!(f, "Number of traces\t{}", self.len())?;
        writeln!(f, "Number of events\t{}", self.get_number_of_events())?;
        writeln!(
            f,
            "Number of activities\t{}",
            self.activity_key.get_number_of_activities()
        )?;
        Ok(write!(f, "")?)
    }
}
