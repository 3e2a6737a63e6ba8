use std::{
    collections::HashMap,
    fmt::{Debug, Display},
    hash::Hash,
};

/// An interned activity label. Activities are only comparable when they come
/// from the same `ActivityKey`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Activity {
    id: usize,
}

impl Display for Activity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ac{}", self.id)
    }
}

impl Debug for Activity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ac{}", self.id)
    }
}

#[derive(Clone, Debug, Default)]
pub struct ActivityKey {
    name2activity: HashMap<String, Activity>,
    activity2name: Vec<String>,
}

impl ActivityKey {
    pub fn new() -> Self {
        Self {
            name2activity: HashMap::new(),
            activity2name: vec![],
        }
    }

    pub fn get_number_of_activities(&self) -> usize {
        self.activity2name.len()
    }

    /// Returns the activity of the label, registering it if it was not known yet.
    pub fn process_activity(&mut self, label: &str) -> Activity {
        match self.name2activity.get(label) {
            Some(activity) => *activity,
            None => {
                let activity = Activity {
                    id: self.activity2name.len(),
                };
                self.activity2name.push(label.to_string());
                self.name2activity.insert(label.to_string(), activity);
                activity
            }
        }
    }

    /// Returns the activity of the label without registering it.
    pub fn get_activity(&self, label: &str) -> Option<Activity> {
        self.name2activity.get(label).copied()
    }

    pub fn get_activity_label(&self, activity: &Activity) -> &str {
        &self.activity2name[activity.id]
    }

    pub fn deprocess_trace(&self, trace: &[Activity]) -> Vec<&str> {
        trace
            .iter()
            .map(|activity| self.get_activity_label(activity))
            .collect()
    }
}

impl Display for ActivityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, label) in self.activity2name.iter().enumerate() {
            write!(f, "ac{}: {}, ", i, label)?;
        }
        write!(f, "")
    }
}

/// Maps the activities of one key onto another key, registering labels in the
/// target key where needed.
pub struct ActivityKeyTranslator {
    from2to: Vec<Activity>,
}

impl ActivityKeyTranslator {
    pub fn new(from: &ActivityKey, to: &mut ActivityKey) -> Self {
        let from2to = from
            .activity2name
            .iter()
            .map(|label| to.process_activity(label))
            .collect();
        Self { from2to }
    }

    pub fn translate_activity(&self, activity: &Activity) -> Activity {
        self.from2to[activity.id]
    }

    pub fn translate_trace(&self, trace: &[Activity]) -> Vec<Activity> {
        trace
            .iter()
            .map(|activity| self.translate_activity(activity))
            .collect()
    }
}
