use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{SubLoan, SubLoanStatus};

/// Minimal view of an installment the allocator works on.
#[derive(Debug, Clone, PartialEq)]
pub struct InstallmentSnapshot {
    pub sub_loan_id: Uuid,
    pub payment_number: i32,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
}

impl InstallmentSnapshot {
    pub fn remaining(&self) -> Decimal {
        self.total_amount - self.paid_amount
    }
}

impl From<&SubLoan> for InstallmentSnapshot {
    fn from(sub_loan: &SubLoan) -> Self {
        Self {
            sub_loan_id: sub_loan.id,
            payment_number: sub_loan.payment_number,
            total_amount: sub_loan.total_amount,
            paid_amount: sub_loan.paid_amount,
        }
    }
}

/// Amount applied to one installment by an allocation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationSlice {
    pub sub_loan_id: Uuid,
    pub payment_number: i32,
    pub amount: Decimal,
    pub paid_amount_after: Decimal,
    pub remaining_after: Decimal,
    pub status_after: SubLoanStatus,
}

/// Outcome of running one payment through the waterfall.
///
/// `slices` lists the target first, then cascaded predecessors in ascending
/// payment-number order. Conservation holds exactly:
/// `sum(slice amounts) + absorbed_excess == amount`.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationPlan {
    pub slices: Vec<AllocationSlice>,
    /// Excess beyond the target and every PARTIAL predecessor. Absorbed: not
    /// refunded, not carried forward; audited only through the Payment row.
    pub absorbed_excess: Decimal,
}

impl AllocationPlan {
    pub fn distributed_total(&self) -> Decimal {
        self.slices.iter().map(|s| s.amount).sum()
    }
}

/// Runs the payment waterfall: fill the target installment first, then
/// cascade any excess into PARTIAL predecessors in ascending payment-number
/// order.
///
/// `predecessors` must contain only PARTIAL installments of the same loan
/// with `payment_number` below the target's, sorted ascending; the engine's
/// batched fetch guarantees this.
///
/// `force_partial_target` is the edit-replace quirk: the target's resulting
/// status is pinned to PARTIAL even when fully covered. Cascaded
/// predecessors always derive their status normally and can end PAID.
pub fn allocate(
    target: &InstallmentSnapshot,
    predecessors: &[InstallmentSnapshot],
    amount: Decimal,
    force_partial_target: bool,
) -> AllocationPlan {
    debug_assert!(amount > Decimal::ZERO);
    debug_assert!(predecessors
        .windows(2)
        .all(|w| w[0].payment_number < w[1].payment_number));

    let mut slices = Vec::with_capacity(1 + predecessors.len());

    let applied = amount.min(target.remaining());
    let mut excess = amount - applied;

    if applied > Decimal::ZERO {
        let paid_after = target.paid_amount + applied;
        let status = if force_partial_target {
            SubLoanStatus::Partial
        } else {
            SubLoanStatus::from_amounts(paid_after, target.total_amount)
        };
        slices.push(AllocationSlice {
            sub_loan_id: target.sub_loan_id,
            payment_number: target.payment_number,
            amount: applied,
            paid_amount_after: paid_after,
            remaining_after: target.total_amount - paid_after,
            status_after: status,
        });
    }

    for predecessor in predecessors {
        if excess <= Decimal::ZERO {
            break;
        }
        debug_assert!(predecessor.payment_number < target.payment_number);

        let take = excess.min(predecessor.remaining());
        if take <= Decimal::ZERO {
            continue;
        }
        let paid_after = predecessor.paid_amount + take;
        slices.push(AllocationSlice {
            sub_loan_id: predecessor.sub_loan_id,
            payment_number: predecessor.payment_number,
            amount: take,
            paid_amount_after: paid_after,
            remaining_after: predecessor.total_amount - paid_after,
            status_after: SubLoanStatus::from_amounts(paid_after, predecessor.total_amount),
        });
        excess -= take;
    }

    AllocationPlan {
        slices,
        absorbed_excess: excess,
    }
}

/// Split of a reverted payment between the target installment and the part
/// that had cascaded onward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RevertSplit {
    pub target_portion: Decimal,
    pub cascaded_excess: Decimal,
}

/// Recomputes how much of a payment actually landed on its installment.
///
/// The last history entry's amount is ground truth; when the history is
/// missing or malformed the split falls back to
/// `min(payment_amount, paid_amount)`.
pub fn revert_attribution(
    payment_amount: Decimal,
    last_entry_amount: Option<Decimal>,
    paid_amount: Decimal,
) -> RevertSplit {
    let target_portion = last_entry_amount
        .unwrap_or_else(|| payment_amount.min(paid_amount))
        .min(payment_amount)
        .min(paid_amount);

    RevertSplit {
        target_portion,
        cascaded_excess: payment_amount - target_portion,
    }
}

/// A predecessor whose most recent allocation is eligible to be unwound.
/// Callers pre-filter candidates (same loan, lower payment number, matching
/// business date where required) and order them most recently touched first.
#[derive(Debug, Clone, PartialEq)]
pub struct UndoCandidate {
    pub sub_loan_id: Uuid,
    /// Amount of the candidate's most recent allocation entry.
    pub last_entry_amount: Decimal,
    pub paid_amount: Decimal,
}

/// One step of a cascade unwind.
#[derive(Debug, Clone, PartialEq)]
pub struct CascadeUndo {
    pub sub_loan_id: Uuid,
    pub amount: Decimal,
    /// True when the candidate's last history entry is consumed whole and
    /// should be popped; false when it is merely shrunk.
    pub pops_entry: bool,
}

/// Plans how much to claw back from each predecessor, most recently touched
/// first, until the cascaded excess is recovered or candidates run out.
pub fn plan_cascade_unwind(candidates: &[UndoCandidate], excess: Decimal) -> Vec<CascadeUndo> {
    let mut remaining = excess;
    let mut undos = Vec::new();

    for candidate in candidates {
        if remaining <= Decimal::ZERO {
            break;
        }
        let amount = remaining
            .min(candidate.last_entry_amount)
            .min(candidate.paid_amount);
        if amount <= Decimal::ZERO {
            continue;
        }
        undos.push(CascadeUndo {
            sub_loan_id: candidate.sub_loan_id,
            amount,
            pops_entry: amount == candidate.last_entry_amount,
        });
        remaining -= amount;
    }

    undos
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn snapshot(n: i32, total: Decimal, paid: Decimal) -> InstallmentSnapshot {
        InstallmentSnapshot {
            sub_loan_id: Uuid::new_v4(),
            payment_number: n,
            total_amount: total,
            paid_amount: paid,
        }
    }

    #[test]
    fn test_partial_payment_stays_on_target() {
        // Register 400 on a pending 500 installment: PARTIAL, no cascade.
        let target = snapshot(2, dec!(500), dec!(0));
        let plan = allocate(&target, &[], dec!(400), false);

        assert_eq!(plan.slices.len(), 1);
        assert_eq!(plan.slices[0].amount, dec!(400));
        assert_eq!(plan.slices[0].paid_amount_after, dec!(400));
        assert_eq!(plan.slices[0].status_after, SubLoanStatus::Partial);
        assert_eq!(plan.absorbed_excess, Decimal::ZERO);
    }

    #[test]
    fn test_overpayment_without_predecessors_is_absorbed() {
        // 1200 against a 1000 installment with no PARTIAL predecessor: the
        // 200 excess is absorbed with no further effect.
        let target = snapshot(1, dec!(1000), dec!(0));
        let plan = allocate(&target, &[], dec!(1200), false);

        assert_eq!(plan.slices.len(), 1);
        assert_eq!(plan.slices[0].amount, dec!(1000));
        assert_eq!(plan.slices[0].status_after, SubLoanStatus::Paid);
        assert_eq!(plan.absorbed_excess, dec!(200));
        assert_eq!(plan.distributed_total() + plan.absorbed_excess, dec!(1200));
    }

    #[test]
    fn test_excess_cascades_to_partial_predecessor() {
        // A: #1, 500 total, 300 paid (remaining 200). B: #2, 500 total, 0 paid.
        // Register 700 on B: B fully paid, 200 flows to A, A ends PAID.
        let a = snapshot(1, dec!(500), dec!(300));
        let b = snapshot(2, dec!(500), dec!(0));

        let plan = allocate(&b, &[a.clone()], dec!(700), false);

        assert_eq!(plan.slices.len(), 2);
        assert_eq!(plan.slices[0].payment_number, 2);
        assert_eq!(plan.slices[0].amount, dec!(500));
        assert_eq!(plan.slices[0].status_after, SubLoanStatus::Paid);
        assert_eq!(plan.slices[1].sub_loan_id, a.sub_loan_id);
        assert_eq!(plan.slices[1].amount, dec!(200));
        assert_eq!(plan.slices[1].paid_amount_after, dec!(500));
        assert_eq!(plan.slices[1].status_after, SubLoanStatus::Paid);
        assert_eq!(plan.absorbed_excess, Decimal::ZERO);
    }

    #[test]
    fn test_cascade_fills_ascending_order() {
        let p1 = snapshot(1, dec!(100), dec!(60)); // remaining 40
        let p3 = snapshot(3, dec!(100), dec!(90)); // remaining 10
        let target = snapshot(5, dec!(100), dec!(0));

        let plan = allocate(&target, &[p1.clone(), p3.clone()], dec!(130), false);

        assert_eq!(plan.slices.len(), 3);
        assert_eq!(plan.slices[1].sub_loan_id, p1.sub_loan_id);
        assert_eq!(plan.slices[1].amount, dec!(30));
        assert_eq!(plan.slices[1].status_after, SubLoanStatus::Partial);
        // p3 untouched: the 30 excess ran dry on p1.
        assert!(plan.slices.iter().all(|s| s.sub_loan_id != p3.sub_loan_id));
        assert_eq!(plan.absorbed_excess, Decimal::ZERO);
    }

    #[test]
    fn test_leftover_after_all_predecessors_is_absorbed() {
        let p1 = snapshot(1, dec!(100), dec!(95)); // remaining 5
        let target = snapshot(2, dec!(100), dec!(80)); // remaining 20

        let plan = allocate(&target, &[p1], dec!(100), false);

        assert_eq!(plan.distributed_total(), dec!(25));
        assert_eq!(plan.absorbed_excess, dec!(75));
    }

    #[test]
    fn test_conservation_exact_cents() {
        let p1 = snapshot(1, dec!(333.33), dec!(100.10));
        let p2 = snapshot(2, dec!(333.33), dec!(0.01));
        let target = snapshot(4, dec!(333.34), dec!(12.57));

        let amount = dec!(901.01);
        let plan = allocate(&target, &[p1, p2], amount, false);

        assert_eq!(plan.distributed_total() + plan.absorbed_excess, amount);
    }

    #[test]
    fn test_forced_partial_target_still_cascades() {
        // Edit-replace quirk: target pinned to PARTIAL even when covered in
        // full; the cascade still runs and predecessors can end PAID.
        let a = snapshot(1, dec!(500), dec!(400)); // remaining 100
        let b = snapshot(2, dec!(500), dec!(0));

        let plan = allocate(&b, &[a], dec!(600), true);

        assert_eq!(plan.slices[0].paid_amount_after, dec!(500));
        assert_eq!(plan.slices[0].status_after, SubLoanStatus::Partial);
        assert_eq!(plan.slices[1].amount, dec!(100));
        assert_eq!(plan.slices[1].status_after, SubLoanStatus::Paid);
    }

    #[test]
    fn test_revert_attribution_prefers_history() {
        let split = revert_attribution(dec!(700), Some(dec!(500)), dec!(500));
        assert_eq!(split.target_portion, dec!(500));
        assert_eq!(split.cascaded_excess, dec!(200));
    }

    #[test]
    fn test_revert_attribution_fallback_min() {
        let split = revert_attribution(dec!(700), None, dec!(500));
        assert_eq!(split.target_portion, dec!(500));
        assert_eq!(split.cascaded_excess, dec!(200));

        let split = revert_attribution(dec!(300), None, dec!(500));
        assert_eq!(split.target_portion, dec!(300));
        assert_eq!(split.cascaded_excess, Decimal::ZERO);
    }

    #[test]
    fn test_revert_attribution_clamps_bad_history() {
        // A history entry larger than either bound never over-reverts.
        let split = revert_attribution(dec!(200), Some(dec!(900)), dec!(150));
        assert_eq!(split.target_portion, dec!(150));
        assert_eq!(split.cascaded_excess, dec!(50));
    }

    #[test]
    fn test_cascade_unwind_most_recent_first() {
        let c1 = UndoCandidate {
            sub_loan_id: Uuid::new_v4(),
            last_entry_amount: dec!(150),
            paid_amount: dec!(500),
        };
        let c2 = UndoCandidate {
            sub_loan_id: Uuid::new_v4(),
            last_entry_amount: dec!(100),
            paid_amount: dec!(100),
        };

        let undos = plan_cascade_unwind(&[c1.clone(), c2.clone()], dec!(200));

        assert_eq!(undos.len(), 2);
        assert_eq!(undos[0].sub_loan_id, c1.sub_loan_id);
        assert_eq!(undos[0].amount, dec!(150));
        assert!(undos[0].pops_entry);
        assert_eq!(undos[1].amount, dec!(50));
        assert!(!undos[1].pops_entry);
    }

    #[test]
    fn test_cascade_unwind_stops_when_recovered() {
        let c1 = UndoCandidate {
            sub_loan_id: Uuid::new_v4(),
            last_entry_amount: dec!(80),
            paid_amount: dec!(80),
        };
        let c2 = UndoCandidate {
            sub_loan_id: Uuid::new_v4(),
            last_entry_amount: dec!(40),
            paid_amount: dec!(40),
        };

        let undos = plan_cascade_unwind(&[c1, c2], dec!(80));
        assert_eq!(undos.len(), 1);
        assert_eq!(undos[0].amount, dec!(80));
    }
}
