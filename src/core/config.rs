//! Machine description for the target processor.
//!
//! The processor issues one *bundle* per cycle. A bundle holds, for every
//! functional engine, at most `width` operations. Results of an operation
//! issued at cycle `t` become visible to operations issued at cycle
//! `t + latency`.
//!
//! The description is plain data: it is loaded once per build and never
//! changes while a program is generated or executed.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::{BuildError, BuildResult};

/// Functional engine classes of the target processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// Scalar integer unit.
    Alu,
    /// Vector integer unit.
    Valu,
    /// Memory reads and immediate materialization.
    Load,
    /// Memory writes.
    Store,
    /// Selects and control.
    Flow,
    /// Trace comparisons, no architectural effect.
    Debug,
}

impl Engine {
    /// Number of engine classes.
    pub const COUNT: usize = 6;

    /// All engines in bundle order.
    pub const ALL: [Engine; Engine::COUNT] = [
        Engine::Alu,
        Engine::Valu,
        Engine::Load,
        Engine::Store,
        Engine::Flow,
        Engine::Debug,
    ];

    /// Dense index used for per-engine arrays.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Engine::Alu => 0,
            Engine::Valu => 1,
            Engine::Load => 2,
            Engine::Store => 3,
            Engine::Flow => 4,
            Engine::Debug => 5,
        }
    }

    /// Lowercase engine name.
    pub fn name(self) -> &'static str {
        match self {
            Engine::Alu => "alu",
            Engine::Valu => "valu",
            Engine::Load => "load",
            Engine::Store => "store",
            Engine::Flow => "flow",
            Engine::Debug => "debug",
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Issue width and result latency of one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSpec {
    /// Maximum operations of this engine per bundle.
    pub width: usize,
    /// Cycles between issue and visibility of the result.
    pub latency: u32,
}

impl EngineSpec {
    pub const fn new(width: usize, latency: u32) -> Self {
        Self { width, latency }
    }
}

/// Per-engine limits, one named field per engine so JSON descriptions stay readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineTable {
    pub alu: EngineSpec,
    pub valu: EngineSpec,
    pub load: EngineSpec,
    pub store: EngineSpec,
    pub flow: EngineSpec,
    pub debug: EngineSpec,
}

impl EngineTable {
    /// Limits of one engine.
    #[inline]
    pub fn get(&self, engine: Engine) -> &EngineSpec {
        match engine {
            Engine::Alu => &self.alu,
            Engine::Valu => &self.valu,
            Engine::Load => &self.load,
            Engine::Store => &self.store,
            Engine::Flow => &self.flow,
            Engine::Debug => &self.debug,
        }
    }

    /// Mutable limits of one engine.
    pub fn get_mut(&mut self, engine: Engine) -> &mut EngineSpec {
        match engine {
            Engine::Alu => &mut self.alu,
            Engine::Valu => &mut self.valu,
            Engine::Load => &mut self.load,
            Engine::Store => &mut self.store,
            Engine::Flow => &mut self.flow,
            Engine::Debug => &mut self.debug,
        }
    }

    /// Issue widths indexed by `Engine::index`.
    pub fn widths(&self) -> [usize; Engine::COUNT] {
        Engine::ALL.map(|e| self.get(e).width)
    }

    /// Latencies indexed by `Engine::index`.
    pub fn latencies(&self) -> [u32; Engine::COUNT] {
        Engine::ALL.map(|e| self.get(e).latency)
    }
}

impl Default for EngineTable {
    fn default() -> Self {
        Self {
            alu: EngineSpec::new(12, 1),
            valu: EngineSpec::new(6, 1),
            load: EngineSpec::new(2, 1),
            store: EngineSpec::new(2, 1),
            flow: EngineSpec::new(1, 1),
            debug: EngineSpec::new(64, 1),
        }
    }
}

/// Full description of the target processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineConfig {
    /// Lanes per vector register.
    pub vlen: usize,
    /// Words of scratch storage available to a program.
    pub scratch_size: usize,
    /// Per-engine issue widths and latencies.
    pub engines: EngineTable,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            vlen: 8,
            scratch_size: 1536,
            engines: EngineTable::default(),
        }
    }
}

impl MachineConfig {
    /// Default machine with every latency replaced by `latency`.
    pub fn uniform_latency(latency: u32) -> Self {
        let mut config = Self::default();
        for engine in Engine::ALL {
            config.engines.get_mut(engine).latency = latency;
        }
        config
    }

    /// Builder-style override of one engine's latency.
    pub fn with_latency(mut self, engine: Engine, latency: u32) -> Self {
        self.engines.get_mut(engine).latency = latency;
        self
    }

    /// Builder-style override of one engine's width.
    pub fn with_width(mut self, engine: Engine, width: usize) -> Self {
        self.engines.get_mut(engine).width = width;
        self
    }

    /// Limits of one engine.
    #[inline]
    pub fn engine(&self, engine: Engine) -> &EngineSpec {
        self.engines.get(engine)
    }

    /// Latency of one engine.
    #[inline]
    pub fn latency(&self, engine: Engine) -> u32 {
        self.engines.get(engine).latency
    }

    /// Issue width of one engine.
    #[inline]
    pub fn width(&self, engine: Engine) -> usize {
        self.engines.get(engine).width
    }

    /// Check that the description can host a program at all.
    pub fn validate(&self) -> BuildResult<()> {
        if self.vlen == 0 {
            return Err(BuildError::InvalidConfig("vlen must be at least 1".into()));
        }
        if self.scratch_size == 0 {
            return Err(BuildError::InvalidConfig("scratch_size must be at least 1".into()));
        }
        if u32::try_from(self.scratch_size).is_err() {
            return Err(BuildError::InvalidConfig(format!(
                "scratch_size {} does not fit a 32-bit address",
                self.scratch_size
            )));
        }
        for engine in Engine::ALL {
            let spec = self.engine(engine);
            if spec.width == 0 {
                return Err(BuildError::InvalidConfig(format!("{} width must be at least 1", engine)));
            }
            if spec.latency == 0 {
                return Err(BuildError::InvalidConfig(format!("{} latency must be at least 1", engine)));
            }
        }
        Ok(())
    }

    /// Parse and validate a JSON description.
    pub fn from_json(text: &str) -> BuildResult<Self> {
        let config: MachineConfig =
            serde_json::from_str(text).map_err(|e| BuildError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON description from disk.
    pub fn from_file(path: &Path) -> BuildResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| BuildError::ConfigParse(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    /// Pretty JSON rendering.
    pub fn to_json(&self) -> String {
        // Plain data with string keys cannot fail to serialize.
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}
