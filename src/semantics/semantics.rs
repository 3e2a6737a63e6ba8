use anyhow::Result;
use std::fmt::Debug;

use crate::{
    ebi_framework::{activity_key::Activity, displayable::Displayable},
    ebi_objects::labelled_petri_net::TransitionIndex,
    marking::Marking,
};

/// Token-game semantics of a model: how states are built from markings, which transitions are
/// enabled and what firing a transition does.
pub trait Semantics: Debug + Send + Sync {
    type SemState: Displayable;

    /// Returns the state corresponding to the marking.
    /// Fails if the marking does not fit the model.
    fn get_state(&self, marking: &Marking) -> Result<Self::SemState>;

    /// Update the state to reflect execution of `transition`.
    /// Returns an error when `transition` is not enabled, or when the marking cannot be represented.
    /// This alters the state to avoid repeated memory allocations in simple walkthroughs.
    fn execute_transition(
        &self,
        state: &mut Self::SemState,
        transition: TransitionIndex,
    ) -> Result<()>;

    fn get_marking<'a>(&self, state: &'a Self::SemState) -> &'a Marking;

    /// Returns whether the state corresponds exactly to the given marking.
    fn is_state_marking(&self, state: &Self::SemState, marking: &Marking) -> bool;

    /// Returns the largest number of tokens in any place of the state.
    fn get_maximum_tokens(&self, state: &Self::SemState) -> u64;

    fn is_transition_silent(&self, transition: TransitionIndex) -> bool;

    fn get_transition_activity(&self, transition: TransitionIndex) -> Option<Activity>;

    /// Returns the enabled transitions in `state`, in increasing order.
    fn get_enabled_transitions(&self, state: &Self::SemState) -> Vec<TransitionIndex>;

    fn get_number_of_transitions(&self) -> usize;
}
