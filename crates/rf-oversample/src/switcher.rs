//! Pre-built per-order converter instances
//!
//! Every supported order gets its own fully allocated converter at
//! configuration time; switching order at run time is an index store.

use crate::handoff::OrderSelector;
use crate::{BlockRequest, Resampler};
use rf_core::{Channels, ChannelsMut, RfError, RfResult};

/// One converter per order `1..=max_order`.
#[derive(Debug)]
pub struct OrderSwitch<R> {
    /// `instances[order - 1]`
    instances: Vec<R>,
    active: usize,
}

impl<R: Resampler> OrderSwitch<R> {
    /// Build `max_order` instances; `build` receives the order (1-based).
    /// The highest order starts active.
    pub fn build<F>(max_order: usize, mut build: F) -> RfResult<Self>
    where
        F: FnMut(usize) -> RfResult<R>,
    {
        if max_order == 0 {
            return Err(RfError::InvalidParam("order switch needs at least one order".into()));
        }
        let instances = (1..=max_order).map(&mut build).collect::<RfResult<Vec<_>>>()?;
        log::debug!("OrderSwitch: built {max_order} instances");
        Ok(Self {
            instances,
            active: max_order - 1,
        })
    }

    #[inline]
    pub fn max_order(&self) -> usize {
        self.instances.len()
    }

    #[inline]
    pub fn order(&self) -> usize {
        self.active + 1
    }

    /// Select the instance for `order`. The newly selected instance is reset
    /// so it never resumes from stale history. Never allocates.
    pub fn set_order(&mut self, order: usize) -> RfResult<()> {
        if order == 0 || order > self.instances.len() {
            return Err(RfError::OrderOutOfRange {
                order,
                min: 1,
                max: self.instances.len(),
            });
        }
        if order - 1 != self.active {
            self.active = order - 1;
            self.instances[self.active].reset();
        }
        Ok(())
    }

    /// Apply the order published on `selector`. Returns `true` on a switch.
    pub fn sync(&mut self, selector: &OrderSelector) -> RfResult<bool> {
        let order = selector.get();
        if order == self.order() {
            return Ok(false);
        }
        self.set_order(order)?;
        Ok(true)
    }

    #[inline]
    pub fn active(&self) -> &R {
        &self.instances[self.active]
    }

    #[inline]
    pub fn active_mut(&mut self) -> &mut R {
        &mut self.instances[self.active]
    }

    /// Instance for `order`, if built
    pub fn get(&self, order: usize) -> Option<&R> {
        order.checked_sub(1).and_then(|i| self.instances.get(i))
    }

    pub fn reset(&mut self) {
        for instance in &mut self.instances {
            instance.reset();
        }
    }
}

/// Configured with one converter configuration per order, lowest first.
impl<R: Resampler> Resampler for OrderSwitch<R> {
    type Config = Vec<R::Config>;

    fn new(configs: &Vec<R::Config>) -> RfResult<Self> {
        Self::build(configs.len(), |order| R::new(&configs[order - 1]))
    }

    fn configure(&mut self, configs: &Vec<R::Config>) -> RfResult<()> {
        let order = self.order();
        let mut rebuilt = <Self as Resampler>::new(configs)?;
        rebuilt.active = order.clamp(1, rebuilt.max_order()) - 1;
        *self = rebuilt;
        Ok(())
    }

    fn process_block<I, O>(&mut self, input: &I, output: &mut O, request: BlockRequest) -> RfResult<usize>
    where
        I: Channels + ?Sized,
        O: ChannelsMut + ?Sized,
    {
        self.active_mut().process_block(input, output, request)
    }

    fn reset(&mut self) {
        OrderSwitch::reset(self);
    }

    fn latency(&self) -> f64 {
        self.active().latency()
    }
}
