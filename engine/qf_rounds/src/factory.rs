//! # Instance Factory
//!
//! Holds the single mutable pointer to the current round template and stamps
//! out independent round instances from it. Each instance gets a fresh state
//! record and a shared reference to the immutable behavior definition it was
//! created from, so a later template swap never affects existing instances.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::info;

use crate::codec;
use crate::errors::{ProtocolError, Result};
use crate::events::{EventLog, InstanceCreated, ProtocolEvent, TemplateUpdated};
use crate::types::{Address, RoundParams};

/// Namespace byte for factory-allocated instance addresses.
const INSTANCE_NAMESPACE: u8 = 0x51;

/// Shared behavior definition every instance of a template delegates to.
pub trait RoundBehavior {
    /// Run one-time initialization for a fresh instance.
    ///
    /// Must fully validate `encoded_params`; failure means no instance is
    /// created.
    fn initialize(&self, encoded_params: &[u8]) -> Result<RoundParams>;
}

/// The stock quadratic-funding round template.
#[derive(Debug, Default)]
pub struct QfRoundTemplate;

impl RoundBehavior for QfRoundTemplate {
    fn initialize(&self, encoded_params: &[u8]) -> Result<RoundParams> {
        let params = codec::decode_round_params(encoded_params)?;
        if params.round_end <= params.round_start {
            return Err(ProtocolError::InitializationFailed(format!(
                "round window is empty: start {} >= end {}",
                params.round_start, params.round_end
            )));
        }
        Ok(params)
    }
}

/// An independently addressable round created from a template.
///
/// Identity is immutable once created; ownership is a logical association
/// recorded in the creation event, not enforced here.
pub struct RoundInstance {
    address: Address,
    owner: Address,
    behavior: Rc<dyn RoundBehavior>,
    params: RoundParams,
}

impl RoundInstance {
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn params(&self) -> &RoundParams {
        &self.params
    }

    /// The shared behavior definition this instance was created from.
    pub fn behavior(&self) -> Rc<dyn RoundBehavior> {
        Rc::clone(&self.behavior)
    }
}

impl fmt::Debug for RoundInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoundInstance")
            .field("address", &self.address)
            .field("owner", &self.owner)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

pub struct RoundFactory {
    admin: Address,
    current_template: RefCell<Option<(Address, Rc<dyn RoundBehavior>)>>,
    instances_created: Cell<u64>,
}

impl RoundFactory {
    /// A new factory with no template configured.
    pub fn new(admin: Address) -> Self {
        Self {
            admin,
            current_template: RefCell::new(None),
            instances_created: Cell::new(0),
        }
    }

    pub fn admin(&self) -> Address {
        self.admin
    }

    /// Address of the currently configured template, if any.
    pub fn current_template(&self) -> Option<Address> {
        self.current_template.borrow().as_ref().map(|(addr, _)| *addr)
    }

    /// Number of instances successfully created so far.
    pub fn instance_count(&self) -> u64 {
        self.instances_created.get()
    }

    /// Replace the current template pointer. Restricted to the administrator.
    ///
    /// No well-formedness validation is performed here; a broken template
    /// only fails later, at instance initialization time.
    pub fn set_template(
        &self,
        events: &EventLog,
        caller: &Address,
        template: Address,
        behavior: Rc<dyn RoundBehavior>,
    ) -> Result<()> {
        if *caller != self.admin {
            return Err(ProtocolError::Unauthorized);
        }
        *self.current_template.borrow_mut() = Some((template, behavior));
        events.publish(ProtocolEvent::TemplateUpdated(TemplateUpdated { template }));
        info!(template = %template, "round template updated");
        Ok(())
    }

    /// Create and initialize a new round instance. Callable by anyone.
    ///
    /// Initialization must succeed or no instance is considered created.
    /// There is no deduplication: identical parameters produce independent
    /// instances at distinct addresses.
    pub fn create_instance(
        &self,
        events: &EventLog,
        encoded_params: &[u8],
        owner: Address,
    ) -> Result<Rc<RoundInstance>> {
        let (template, behavior) = self
            .current_template
            .borrow()
            .clone()
            .ok_or(ProtocolError::NoTemplateConfigured)?;

        let params = behavior.initialize(encoded_params)?;

        let index = self.instances_created.get();
        let address = Address::derive(INSTANCE_NAMESPACE, index);
        self.instances_created.set(index + 1);

        let instance = Rc::new(RoundInstance {
            address,
            owner,
            behavior,
            params,
        });
        events.publish(ProtocolEvent::InstanceCreated(InstanceCreated {
            instance: address,
            owner,
        }));
        info!(instance = %address, owner = %owner, template = %template, "round instance created");
        Ok(instance)
    }
}
