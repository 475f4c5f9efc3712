//! In-process ledgers.
//!
//! Self-contained implementations of both collaborator contracts, for
//! embedders that run a market without an external token system and for
//! tests. Cloning a ledger snapshots it.

use std::collections::HashMap;

use itertools::Itertools;

use crate::ledger::{
    CollateralLedger, CollectionId, ConditionId, LedgerError, PositionId,
    PositionLedger,
};
use crate::math::wide::U256;
use crate::state::{MAX_OUTCOMES, MIN_OUTCOMES, OutcomeMask};
use crate::types::{Address, QuestionId};

#[derive(Clone, Debug, PartialEq, Eq)]
struct Condition {
    num_outcomes: usize,
    payouts: Option<Vec<u128>>,
}

impl Condition {
    fn denominator(&self) -> u128 {
        self.payouts
            .as_deref()
            .map_or(0, |payouts| payouts.iter().sum())
    }
}

/// Conditional-token ledger backed by hash maps
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InMemoryPositionLedger {
    address: Address,
    conditions: HashMap<ConditionId, Condition>,
    balances: HashMap<(Address, PositionId), u128>,
}

impl InMemoryPositionLedger {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            conditions: HashMap::new(),
            balances: HashMap::new(),
        }
    }

    fn condition(&self, id: &ConditionId) -> Result<&Condition, LedgerError> {
        self.conditions
            .get(id)
            .ok_or(LedgerError::UnknownCondition(*id))
    }

    fn mint(
        &mut self,
        holder: Address,
        position: PositionId,
        amount: u128,
    ) -> Result<(), LedgerError> {
        let balance = self.balances.entry((holder, position)).or_default();
        *balance = balance.checked_add(amount).ok_or(LedgerError::Overflow)?;
        Ok(())
    }

    fn burn(
        &mut self,
        holder: Address,
        position: PositionId,
        amount: u128,
    ) -> Result<(), LedgerError> {
        let available = PositionLedger::balance_of(self, &holder, &position);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                holder,
                required: amount,
                available,
            });
        }
        self.balances.insert((holder, position), available - amount);
        Ok(())
    }
}

impl PositionLedger for InMemoryPositionLedger {
    fn address(&self) -> Address {
        self.address
    }

    fn prepare_condition(
        &mut self,
        oracle: Address,
        question: QuestionId,
        num_outcomes: usize,
    ) -> Result<ConditionId, LedgerError> {
        if !(MIN_OUTCOMES..=MAX_OUTCOMES).contains(&num_outcomes) {
            return Err(LedgerError::InvalidOutcomeSlotCount(num_outcomes));
        }
        let id = self.condition_id(&oracle, &question, num_outcomes);
        if self.conditions.contains_key(&id) {
            return Err(LedgerError::ConditionAlreadyPrepared(id));
        }
        self.conditions.insert(
            id,
            Condition {
                num_outcomes,
                payouts: None,
            },
        );
        tracing::debug!(
            condition = %id,
            %oracle,
            num_outcomes,
            "prepared condition"
        );
        Ok(id)
    }

    fn split_position<C: CollateralLedger>(
        &mut self,
        collateral: &mut C,
        holder: Address,
        parent: CollectionId,
        condition: ConditionId,
        partition: &[OutcomeMask],
        amount: u128,
    ) -> Result<(), LedgerError> {
        let num_outcomes = self.condition(&condition)?.num_outcomes;
        if partition.len() < 2 {
            return Err(LedgerError::InvalidPartition {
                reason: "needs at least two elements",
            });
        }
        let mut covered = 0u128;
        for element in partition {
            if !element.is_within(num_outcomes) {
                return Err(LedgerError::InvalidPartition {
                    reason: "element outside the outcome slots",
                });
            }
            if covered & element.bits() != 0 {
                return Err(LedgerError::InvalidPartition {
                    reason: "elements overlap",
                });
            }
            covered |= element.bits();
        }
        let full = OutcomeMask::full(num_outcomes)
            .map_err(|_| LedgerError::InvalidOutcomeSlotCount(num_outcomes))?;
        if covered != full.bits() {
            return Err(LedgerError::InvalidPartition {
                reason: "elements do not cover every outcome slot",
            });
        }

        let token = collateral.token();
        if parent == CollectionId::ROOT {
            if !collateral.transfer_from(
                self.address,
                holder,
                self.address,
                amount,
            )? {
                return Err(LedgerError::CollateralRefused { holder, amount });
            }
        } else {
            let position = self.position_id(&token, &parent);
            self.burn(holder, position, amount)?;
        }
        for element in partition {
            let collection = self.collection_id(&parent, &condition, *element);
            let position = self.position_id(&token, &collection);
            self.mint(holder, position, amount)?;
        }
        tracing::debug!(
            %condition,
            %holder,
            amount,
            parts = partition.len(),
            "split position"
        );
        Ok(())
    }

    fn report_payouts(
        &mut self,
        condition: ConditionId,
        payouts: &[u128],
    ) -> Result<(), LedgerError> {
        let entry = self
            .conditions
            .get_mut(&condition)
            .ok_or(LedgerError::UnknownCondition(condition))?;
        if entry.payouts.is_some() {
            return Err(LedgerError::PayoutsAlreadyReported(condition));
        }
        if payouts.len() != entry.num_outcomes {
            return Err(LedgerError::InvalidPayouts {
                reason: "length does not match the outcome slot count",
            });
        }
        let denominator = payouts
            .iter()
            .try_fold(0u128, |acc, payout| acc.checked_add(*payout))
            .ok_or(LedgerError::Overflow)?;
        if denominator == 0 {
            return Err(LedgerError::InvalidPayouts {
                reason: "payouts are all zero",
            });
        }
        entry.payouts = Some(payouts.to_vec());
        tracing::debug!(%condition, denominator, "reported payouts");
        Ok(())
    }

    fn payout_denominator(
        &self,
        condition: &ConditionId,
    ) -> Result<u128, LedgerError> {
        Ok(self.condition(condition)?.denominator())
    }

    fn redeem_positions<C: CollateralLedger>(
        &mut self,
        collateral: &mut C,
        holder: Address,
        parent: CollectionId,
        condition: ConditionId,
        index_sets: &[OutcomeMask],
    ) -> Result<u128, LedgerError> {
        let entry = self.condition(&condition)?;
        let denominator = entry.denominator();
        let Some(payouts) = entry.payouts.clone() else {
            return Err(LedgerError::PayoutsNotReported(condition));
        };

        if !index_sets.iter().all_unique() {
            return Err(LedgerError::InvalidPartition {
                reason: "repeated index set",
            });
        }
        let token = collateral.token();
        let mut total = 0u128;
        for index_set in index_sets {
            if !index_set.is_within(payouts.len()) {
                return Err(LedgerError::InvalidPartition {
                    reason: "index set outside the outcome slots",
                });
            }
            let collection =
                self.collection_id(&parent, &condition, *index_set);
            let position = self.position_id(&token, &collection);
            let balance = PositionLedger::balance_of(self, &holder, &position);
            if balance == 0 {
                continue;
            }
            let numerator: u128 =
                index_set.indices().map(|index| payouts[index]).sum();
            let payout = U256::full_mul(balance, numerator)
                .div_u128(denominator)
                .and_then(U256::to_u128)
                .ok_or(LedgerError::Overflow)?;
            self.burn(holder, position, balance)?;
            total = total.checked_add(payout).ok_or(LedgerError::Overflow)?;
        }

        if total > 0 {
            if parent == CollectionId::ROOT {
                collateral.transfer(self.address, holder, total)?;
            } else {
                let position = self.position_id(&token, &parent);
                self.mint(holder, position, total)?;
            }
        }
        tracing::debug!(%condition, %holder, total, "redeemed positions");
        Ok(total)
    }

    fn balance_of(&self, holder: &Address, position: &PositionId) -> u128 {
        self.balances
            .get(&(*holder, *position))
            .copied()
            .unwrap_or_default()
    }

    fn safe_transfer_from(
        &mut self,
        from: Address,
        to: Address,
        position: PositionId,
        amount: u128,
    ) -> Result<(), LedgerError> {
        self.burn(from, position, amount)?;
        self.mint(to, position, amount)
    }
}

/// Fungible token with allowances
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InMemoryCollateral {
    token: Address,
    decimals: u8,
    balances: HashMap<Address, u128>,
    allowances: HashMap<(Address, Address), u128>,
}

impl InMemoryCollateral {
    pub fn new(token: Address, decimals: u8) -> Self {
        Self {
            token,
            decimals,
            balances: HashMap::new(),
            allowances: HashMap::new(),
        }
    }

    pub fn mint(
        &mut self,
        to: Address,
        amount: u128,
    ) -> Result<(), LedgerError> {
        let balance = self.balances.entry(to).or_default();
        *balance = balance.checked_add(amount).ok_or(LedgerError::Overflow)?;
        Ok(())
    }

    fn move_balance(
        &mut self,
        from: Address,
        to: Address,
        amount: u128,
    ) -> Result<(), LedgerError> {
        let available = self.balance_of(&from);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                holder: from,
                required: amount,
                available,
            });
        }
        self.balances.insert(from, available - amount);
        self.mint(to, amount)
    }
}

impl CollateralLedger for InMemoryCollateral {
    fn token(&self) -> Address {
        self.token
    }

    fn decimals(&self) -> u8 {
        self.decimals
    }

    fn balance_of(&self, holder: &Address) -> u128 {
        self.balances.get(holder).copied().unwrap_or_default()
    }

    fn allowance(&self, owner: &Address, spender: &Address) -> u128 {
        self.allowances
            .get(&(*owner, *spender))
            .copied()
            .unwrap_or_default()
    }

    fn approve(&mut self, owner: Address, spender: Address, amount: u128) {
        self.allowances.insert((owner, spender), amount);
    }

    fn transfer(
        &mut self,
        from: Address,
        to: Address,
        amount: u128,
    ) -> Result<(), LedgerError> {
        self.move_balance(from, to, amount)
    }

    fn transfer_from(
        &mut self,
        spender: Address,
        from: Address,
        to: Address,
        amount: u128,
    ) -> Result<bool, LedgerError> {
        let allowance = self.allowance(&from, &spender);
        if allowance < amount || self.balance_of(&from) < amount {
            return Ok(false);
        }
        // An unlimited allowance is never drawn down
        if allowance != u128::MAX {
            self.allowances.insert((from, spender), allowance - amount);
        }
        self.move_balance(from, to, amount)?;
        Ok(true)
    }
}
