//! Legal status edges

use crate::card::CardStatus;
use teller_ledger::AccountStatus;

/// Edges reachable through a plain `transition` call.
///
/// DORMANT -> ACTIVE is deliberately absent: it only happens when an
/// approved REACTIVATE modification runs.
pub fn account_edge(from: AccountStatus, to: AccountStatus) -> bool {
    use AccountStatus::*;
    matches!(
        (from, to),
        (Pending, Approved) | (Approved, Active) | (Pending, Rejected) | (Active, Dormant)
    )
}

pub fn card_edge(from: CardStatus, to: CardStatus) -> bool {
    use CardStatus::*;
    matches!(
        (from, to),
        (Pending, Active)
            | (Active, Blocked)
            | (Blocked, Active)
            | (Pending, Cancelled)
            | (Active, Cancelled)
            | (Blocked, Cancelled)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_edges() {
        assert!(account_edge(AccountStatus::Pending, AccountStatus::Approved));
        assert!(account_edge(AccountStatus::Approved, AccountStatus::Active));
        assert!(account_edge(AccountStatus::Active, AccountStatus::Dormant));
        assert!(!account_edge(AccountStatus::Pending, AccountStatus::Active));
        assert!(!account_edge(AccountStatus::Dormant, AccountStatus::Active));
        assert!(!account_edge(AccountStatus::Rejected, AccountStatus::Pending));
    }

    #[test]
    fn test_card_edges() {
        assert!(card_edge(CardStatus::Pending, CardStatus::Active));
        assert!(card_edge(CardStatus::Blocked, CardStatus::Active));
        assert!(card_edge(CardStatus::Blocked, CardStatus::Cancelled));
        assert!(!card_edge(CardStatus::Cancelled, CardStatus::Active));
        assert!(!card_edge(CardStatus::Pending, CardStatus::Blocked));
    }
}
