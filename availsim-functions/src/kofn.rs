//! ## availsim-functions::kofn
//! **K-of-N availability gate**
//!
//! Deterministic combinator over exactly N dependencies: available iff at
//! least K of them are currently up. Raises a state-change event only when
//! the derived state flips, and registers no wake times of its own. A
//! dependency that has not raised a state change yet counts as up.

use availsim_core::prelude::*;
use tracing::trace;

pub struct KofNGate {
    id: String,
    k: usize,
    n: usize,
    emitted_up: bool,
}

impl KofNGate {
    pub fn new(id: impl Into<String>, k: usize, n: usize) -> Self {
        Self {
            id: id.into(),
            k,
            n,
            emitted_up: true,
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn n(&self) -> usize {
        self.n
    }

    /// Last state this gate reported.
    pub fn is_up(&self) -> bool {
        self.emitted_up
    }
}

impl Producer for KofNGate {
    fn id(&self) -> &str {
        &self.id
    }

    fn initialize(&mut self, ctx: &InitContext<'_>) -> Result<(), ProducerError> {
        if self.n == 0 {
            return Err(ProducerError::Configuration(format!(
                "{}: K-of-N gate needs at least one dependency",
                ctx.id()
            )));
        }
        if self.k > self.n {
            return Err(ProducerError::Configuration(format!(
                "{}: K ({}) exceeds N ({})",
                ctx.id(),
                self.k,
                self.n
            )));
        }
        if ctx.dependencies().len() != self.n {
            return Err(ProducerError::Configuration(format!(
                "{}: configured for N = {} but wired to {} dependencies",
                ctx.id(),
                self.n,
                ctx.dependencies().len()
            )));
        }
        self.emitted_up = true;
        Ok(())
    }

    fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> Result<(), ProducerError> {
        if ctx.is_setup() {
            self.emitted_up = true;
        }
        let up_count = (0..self.n)
            .filter(|&position| ctx.dependency_state(position).unwrap_or(true))
            .count();
        let derived = up_count >= self.k;
        if derived != self.emitted_up {
            self.emitted_up = derived;
            trace!(producer = %ctx.id(), time = ctx.now(), up = derived, up_count, "gate flipped");
            ctx.raise(EventType::STATE_CHANGE, Payload::State(derived));
        }
        Ok(())
    }

    fn duplicate(&self) -> Box<dyn Producer> {
        Box::new(KofNGate::new(self.id.clone(), self.k, self.n))
    }
}
