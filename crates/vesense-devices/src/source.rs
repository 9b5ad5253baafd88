//! ---
//! vs_section: "03-devices"
//! vs_subsection: "module"
//! vs_type: "source"
//! vs_scope: "code"
//! vs_description: "Device models, telemetry sources and polling."
//! vs_version: "v0.0.0-prealpha"
//! vs_owner: "tbd"
//! ---
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

use crate::model::{Model, RawRegister};

/// Produces one decoded reading per signal each time it is polled.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Read every signal once. Errors are transient; the caller skips the tick.
    async fn poll_once(&self) -> Result<IndexMap<String, f64>>;
}

/// Wire-level register access, implemented by the serial protocol driver.
#[async_trait]
pub trait RegisterReader: Send + Sync {
    /// Liveness probe sent before each round of reads.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn read_register(&self, address: u16) -> Result<RawRegister>;
}

#[async_trait]
impl<R: RegisterReader + ?Sized> RegisterReader for Arc<R> {
    async fn ping(&self) -> Result<()> {
        (**self).ping().await
    }

    async fn read_register(&self, address: u16) -> Result<RawRegister> {
        (**self).read_register(address).await
    }
}

/// Reads every register of a model through a [`RegisterReader`] and decodes it.
#[derive(Debug)]
pub struct RegisterSource<R> {
    model: Arc<Model>,
    reader: R,
}

impl<R: RegisterReader> RegisterSource<R> {
    pub fn new(model: Arc<Model>, reader: R) -> Self {
        Self { model, reader }
    }
}

#[async_trait]
impl<R: RegisterReader> TelemetrySource for RegisterSource<R> {
    async fn poll_once(&self) -> Result<IndexMap<String, f64>> {
        if let Err(err) = self.reader.ping().await {
            warn!(model = %self.model.tag(), error = %err, "register ping failed");
        }
        let mut values = IndexMap::with_capacity(self.model.len());
        let mut failures = 0usize;
        for (name, register) in self.model.registers() {
            match self.reader.read_register(register.address).await {
                Ok(raw) => {
                    values.insert(name.to_owned(), register.decode(raw));
                }
                Err(err) => {
                    failures += 1;
                    debug!(register = name, address = register.address, error = %err, "register read failed");
                }
            }
        }
        if values.is_empty() && failures > 0 {
            bail!("all {failures} register reads failed");
        }
        Ok(values)
    }
}

/// Random walk over a model's signals, used for `device = "dummy"`.
#[derive(Debug)]
pub struct DummySource {
    model: Arc<Model>,
    state: Mutex<DummyState>,
}

#[derive(Debug)]
struct DummyState {
    rng: StdRng,
    current: IndexMap<String, f64>,
}

impl DummySource {
    pub fn new(model: Arc<Model>, seed: u64) -> Self {
        let current = model
            .registers()
            .map(|(name, register)| (name.to_owned(), baseline(register.unit)))
            .collect();
        Self {
            model,
            state: Mutex::new(DummyState {
                rng: StdRng::seed_from_u64(seed),
                current,
            }),
        }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }
}

fn baseline(unit: &str) -> f64 {
    match unit {
        "V" => 12.8,
        "%" => 80.0,
        "K" => 293.15,
        "min" => 600.0,
        "h" => 12.0,
        _ => 0.0,
    }
}

#[async_trait]
impl TelemetrySource for DummySource {
    async fn poll_once(&self) -> Result<IndexMap<String, f64>> {
        let mut state = self.state.lock();
        let DummyState { rng, current } = &mut *state;
        for (name, value) in current.iter_mut() {
            let step = self
                .model
                .register(name)
                .map(|register| register.factor * 10.0)
                .unwrap_or(0.1);
            let mut next = *value + rng.gen_range(-step..=step);
            if self.model.register(name).is_some_and(|r| !r.signed) {
                next = next.max(0.0);
            }
            if self.model.register(name).is_some_and(|r| r.unit == "%") {
                next = next.min(100.0);
            }
            *value = next;
        }
        Ok(current.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelRegistry, Register};
    use std::collections::HashMap;

    struct FakeReader {
        registers: HashMap<u16, RawRegister>,
    }

    #[async_trait]
    impl RegisterReader for FakeReader {
        async fn read_register(&self, address: u16) -> Result<RawRegister> {
            match self.registers.get(&address) {
                Some(raw) => Ok(*raw),
                None => bail!("no response for {address:#06x}"),
            }
        }
    }

    fn essential() -> Arc<Model> {
        ModelRegistry::builtin().get("bmv-700-essential").unwrap()
    }

    #[tokio::test]
    async fn register_source_decodes_each_register() {
        let reader = FakeReader {
            registers: HashMap::from([
                (0xED8D, RawRegister::u16(1250)),
                (0xED8F, RawRegister::u16(0xFFEC)),
                (0xED8E, RawRegister::u16(0xFFE7)),
            ]),
        };
        let values = RegisterSource::new(essential(), reader).poll_once().await.unwrap();
        assert!((values["MainVoltage"] - 12.5).abs() < 1e-9);
        assert!((values["Current"] + 2.0).abs() < 1e-9);
        assert_eq!(values["Power"], -25.0);
    }

    #[tokio::test]
    async fn single_register_failure_only_drops_that_signal() {
        let reader = FakeReader {
            registers: HashMap::from([(0xED8D, RawRegister::u16(1250))]),
        };
        let values = RegisterSource::new(essential(), reader).poll_once().await.unwrap();
        assert_eq!(values.len(), 1);
        assert!(values.contains_key("MainVoltage"));
    }

    #[tokio::test]
    async fn all_registers_failing_fails_the_tick() {
        let reader = FakeReader {
            registers: HashMap::new(),
        };
        assert!(RegisterSource::new(essential(), reader).poll_once().await.is_err());
    }

    #[tokio::test]
    async fn dummy_source_is_seeded_and_covers_the_model() {
        let model = Arc::new(
            Model::new("test")
                .with_registers(&[("StateOfCharge", Register::new(1, 0.01, "%", false, 0))]),
        );
        let first = DummySource::new(model.clone(), 7);
        let second = DummySource::new(model, 7);
        for _ in 0..50 {
            let a = first.poll_once().await.unwrap();
            let b = second.poll_once().await.unwrap();
            assert_eq!(a, b);
            let soc = a["StateOfCharge"];
            assert!((0.0..=100.0).contains(&soc));
        }
        assert_eq!(first.model().tag(), "test");
    }
}
