use super::view::View;
use crate::common::MemberId;
use std::collections::HashSet;

/// Who should coordinate once `departed` are gone.
pub(crate) fn successor<'a>(view: &'a View, departed: &HashSet<MemberId>) -> Option<&'a MemberId> {
    view.coordinator_excluding(departed)
}

/// Whether `departing` leaving makes `local` the coordinator.
///
/// The departing member matters if it created the view or is the acting
/// coordinator given the members already known to be leaving.
pub(crate) fn takes_over(
    view: &View,
    departed: &HashSet<MemberId>,
    departing: &MemberId,
    local: &MemberId,
) -> bool {
    let was_coordinating =
        view.creator() == departing || successor(view, departed) == Some(departing);

    if !was_coordinating {
        return false;
    }

    let mut departed = departed.clone();
    departed.insert(departing.clone());

    successor(view, &departed) == Some(local)
}
