//! # Ledger
//!
//! The in-process ledger the engine moves funds on. It plays the role the
//! host execution environment plays for the on-chain original: it holds
//! native balances, per-token balances and `(token, owner, spender)`
//! allowances, and it supplies the all-or-nothing batch semantics the
//! contribution processor relies on.
//!
//! ## Batches
//!
//! All fund movement during donation processing goes through a [`Batch`]
//! obtained from [`Ledger::begin`]. Each transfer is applied immediately and
//! recorded in the batch's undo log; dropping the batch without calling
//! [`Batch::commit`] reverts every recorded operation in reverse order.
//! Reverts restore raw balances and never re-invoke receive hooks.
//!
//! ## Receive hooks
//!
//! A recipient may be executable code. [`Ledger::set_receive_hook`] attaches
//! a callback that runs after funds land on that address; a hook returning
//! an error makes the transfer fail, and a hook is free to call back into
//! the engine (which is exactly the reentrancy hazard the processor's lock
//! exists to contain). Hooks are invoked with no ledger borrow held.
//!
//! There is no genuine parallelism within a single logical ledger, so state
//! lives behind `RefCell` and hooks are `Rc`-shared.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::errors::{ProtocolError, Result};
use crate::types::{Address, Medium};

/// Executable-recipient callback, invoked after funds land on the address.
pub type ReceiveHook = Rc<dyn Fn(Medium, i128) -> std::result::Result<(), String>>;

#[derive(Default)]
pub struct Ledger {
    native: RefCell<HashMap<Address, i128>>,
    /// Keyed by `(token, holder)`.
    tokens: RefCell<HashMap<(Address, Address), i128>>,
    /// Keyed by `(token, owner, spender)`.
    allowances: RefCell<HashMap<(Address, Address, Address), i128>>,
    hooks: RefCell<HashMap<Address, ReceiveHook>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Setup operations ─────────────────────────────────────────────

    pub fn mint_native(&self, to: &Address, amount: i128) {
        let mut native = self.native.borrow_mut();
        let balance = native.entry(*to).or_insert(0);
        *balance = balance.saturating_add(amount);
    }

    pub fn mint_token(&self, token: &Address, to: &Address, amount: i128) {
        let mut tokens = self.tokens.borrow_mut();
        let balance = tokens.entry((*token, *to)).or_insert(0);
        *balance = balance.saturating_add(amount);
    }

    /// Set the allowance `owner` grants `spender` over `token`.
    pub fn approve(&self, token: &Address, owner: &Address, spender: &Address, amount: i128) {
        self.allowances
            .borrow_mut()
            .insert((*token, *owner, *spender), amount);
    }

    /// Attach executable code to `recipient`.
    pub fn set_receive_hook(&self, recipient: &Address, hook: ReceiveHook) {
        self.hooks.borrow_mut().insert(*recipient, hook);
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn native_balance(&self, who: &Address) -> i128 {
        self.native.borrow().get(who).copied().unwrap_or(0)
    }

    pub fn token_balance(&self, token: &Address, who: &Address) -> i128 {
        self.tokens.borrow().get(&(*token, *who)).copied().unwrap_or(0)
    }

    pub fn allowance(&self, token: &Address, owner: &Address, spender: &Address) -> i128 {
        self.allowances
            .borrow()
            .get(&(*token, *owner, *spender))
            .copied()
            .unwrap_or(0)
    }

    /// Open a journaled batch. Drop without [`Batch::commit`] to revert.
    pub fn begin(&self) -> Batch<'_> {
        Batch {
            ledger: self,
            ops: Vec::new(),
            committed: false,
        }
    }

    // ── Internal balance movement ────────────────────────────────────

    fn move_native(&self, from: &Address, to: &Address, amount: i128) -> Result<()> {
        if amount <= 0 {
            return Err(ProtocolError::TransferFailed(format!(
                "non-positive transfer amount {amount}"
            )));
        }
        let mut native = self.native.borrow_mut();
        let src = native.get(from).copied().unwrap_or(0);
        if src < amount {
            return Err(ProtocolError::TransferFailed(format!(
                "insufficient native balance of {from}: {src} < {amount}"
            )));
        }
        // A self-transfer moves nothing once the balance check passes.
        if from == to {
            return Ok(());
        }
        let dst = native.get(to).copied().unwrap_or(0);
        let credited = dst.checked_add(amount).ok_or_else(|| {
            ProtocolError::TransferFailed(format!("native balance of {to} would overflow"))
        })?;
        native.insert(*from, src - amount);
        native.insert(*to, credited);
        Ok(())
    }

    fn move_token(&self, token: &Address, from: &Address, to: &Address, amount: i128) -> Result<()> {
        if amount <= 0 {
            return Err(ProtocolError::TransferFailed(format!(
                "non-positive transfer amount {amount}"
            )));
        }
        let mut tokens = self.tokens.borrow_mut();
        let src = tokens.get(&(*token, *from)).copied().unwrap_or(0);
        if src < amount {
            return Err(ProtocolError::TransferFailed(format!(
                "insufficient balance of token {token} for {from}: {src} < {amount}"
            )));
        }
        if from == to {
            return Ok(());
        }
        let dst = tokens.get(&(*token, *to)).copied().unwrap_or(0);
        let credited = dst.checked_add(amount).ok_or_else(|| {
            ProtocolError::TransferFailed(format!("balance of token {token} for {to} would overflow"))
        })?;
        tokens.insert((*token, *from), src - amount);
        tokens.insert((*token, *to), credited);
        Ok(())
    }

    fn consume_allowance(
        &self,
        token: &Address,
        owner: &Address,
        spender: &Address,
        amount: i128,
    ) -> Result<()> {
        let mut allowances = self.allowances.borrow_mut();
        let granted = allowances.entry((*token, *owner, *spender)).or_insert(0);
        if *granted < amount {
            return Err(ProtocolError::TransferFailed(format!(
                "insufficient allowance of token {token} from {owner}: {granted} < {amount}"
            )));
        }
        *granted -= amount;
        Ok(())
    }

    /// Invoked with no ledger borrow held, so the hook may re-enter.
    fn invoke_hook(&self, recipient: &Address, medium: Medium, amount: i128) -> Result<()> {
        let hook = self.hooks.borrow().get(recipient).cloned();
        match hook {
            Some(hook) => hook(medium, amount).map_err(|reason| {
                ProtocolError::TransferFailed(format!(
                    "recipient {recipient} rejected transfer: {reason}"
                ))
            }),
            None => Ok(()),
        }
    }

    // ── Revert primitives (no checks, no hooks) ──────────────────────

    fn adjust_native(&self, who: &Address, delta: i128) {
        *self.native.borrow_mut().entry(*who).or_insert(0) += delta;
    }

    fn adjust_token(&self, token: &Address, who: &Address, delta: i128) {
        *self.tokens.borrow_mut().entry((*token, *who)).or_insert(0) += delta;
    }

    fn adjust_allowance(&self, token: &Address, owner: &Address, spender: &Address, delta: i128) {
        *self
            .allowances
            .borrow_mut()
            .entry((*token, *owner, *spender))
            .or_insert(0) += delta;
    }
}

/// One applied, revertible ledger operation.
enum Op {
    Native {
        from: Address,
        to: Address,
        amount: i128,
    },
    Token {
        token: Address,
        from: Address,
        to: Address,
        amount: i128,
    },
    Allowance {
        token: Address,
        owner: Address,
        spender: Address,
        amount: i128,
    },
}

/// A journaled batch of transfers. Reverts on drop unless committed.
pub struct Batch<'a> {
    ledger: &'a Ledger,
    ops: Vec<Op>,
    committed: bool,
}

impl Batch<'_> {
    /// Move native currency from `from` to `to`, then run `to`'s hook.
    pub fn transfer_native(&mut self, from: &Address, to: &Address, amount: i128) -> Result<()> {
        self.ledger.move_native(from, to, amount)?;
        self.ops.push(Op::Native {
            from: *from,
            to: *to,
            amount,
        });
        self.ledger.invoke_hook(to, Medium::Native, amount)
    }

    /// Move `token` from `from`'s balance to `to`, spending `spender`'s
    /// allowance, then run `to`'s hook.
    pub fn transfer_token(
        &mut self,
        token: &Address,
        from: &Address,
        to: &Address,
        spender: &Address,
        amount: i128,
    ) -> Result<()> {
        self.ledger.consume_allowance(token, from, spender, amount)?;
        self.ops.push(Op::Allowance {
            token: *token,
            owner: *from,
            spender: *spender,
            amount,
        });
        self.ledger.move_token(token, from, to, amount)?;
        self.ops.push(Op::Token {
            token: *token,
            from: *from,
            to: *to,
            amount,
        });
        self.ledger.invoke_hook(to, Medium::Token(*token), amount)
    }

    /// Keep every operation in this batch.
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for Batch<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for op in self.ops.drain(..).rev() {
            match op {
                Op::Native { from, to, amount } => {
                    self.ledger.adjust_native(&to, -amount);
                    self.ledger.adjust_native(&from, amount);
                }
                Op::Token {
                    token,
                    from,
                    to,
                    amount,
                } => {
                    self.ledger.adjust_token(&token, &to, -amount);
                    self.ledger.adjust_token(&token, &from, amount);
                }
                Op::Allowance {
                    token,
                    owner,
                    spender,
                    amount,
                } => {
                    self.ledger.adjust_allowance(&token, &owner, &spender, amount);
                }
            }
        }
    }
}
