//! Bridge registry and CLI bridge specs

use super::{Bridge, BridgeError, BridgeKind, PositionPairBridge};
use std::str::FromStr;
use std::sync::Arc;

/// Parsed `name=A,B[,shadow|dynamic]` bridge definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeSpec {
    pub name: String,
    pub first: usize,
    pub second: usize,
    pub kind: BridgeKind,
}

impl FromStr for BridgeSpec {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, body) = s
            .split_once('=')
            .ok_or_else(|| BridgeError::InvalidSpec(format!("missing '=' in '{}'", s)))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(BridgeError::InvalidSpec(format!("empty name in '{}'", s)));
        }

        let mut parts = body.split(',').map(str::trim);
        let mut position = |label: &str| -> Result<usize, BridgeError> {
            parts
                .next()
                .and_then(|p| p.parse().ok())
                .ok_or_else(|| BridgeError::InvalidSpec(format!("bad {} position in '{}'", label, s)))
        };
        let first = position("first")?;
        let second = position("second")?;

        let kind = match parts.next() {
            None => BridgeKind::CustomDualPosition,
            Some("shadow") => BridgeKind::PositionShadow,
            Some("dynamic") => BridgeKind::DynamicScored,
            Some(other) => {
                return Err(BridgeError::InvalidSpec(format!(
                    "unknown modifier '{}' in '{}'",
                    other, s
                )))
            }
        };

        Ok(Self {
            name: name.to_string(),
            first,
            second,
            kind,
        })
    }
}

impl BridgeSpec {
    /// Build the bridge this spec describes
    pub fn build(&self) -> PositionPairBridge {
        let bridge = match self.kind {
            BridgeKind::PositionShadow => {
                PositionPairBridge::shadow(&self.name, self.first, self.second)
            }
            _ => PositionPairBridge::new(&self.name, self.first, self.second),
        };
        bridge.with_kind(self.kind)
    }
}

/// Ordered set of bridges taking part in a run
#[derive(Clone, Default)]
pub struct BridgeRegistry {
    bridges: Vec<Arc<dyn Bridge>>,
}

impl BridgeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default bridges: every position pair of the special prize plus their shadows
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for first in 0..5 {
            for second in (first + 1)..5 {
                registry.register(PositionPairBridge::new(
                    format!("special-{}{}", first, second),
                    first,
                    second,
                ));
            }
        }
        for (first, second) in [(3, 4), (0, 4)] {
            registry.register(PositionPairBridge::shadow(
                format!("shadow-{}{}", first, second),
                first,
                second,
            ));
        }
        registry
    }

    /// Build a registry from CLI specs
    pub fn from_specs(specs: &[BridgeSpec]) -> Self {
        let mut registry = Self::new();
        for spec in specs {
            registry.register(spec.build());
        }
        registry
    }

    /// Add a bridge; a bridge with the same name is replaced in place
    pub fn register(&mut self, bridge: impl Bridge + 'static) {
        let bridge: Arc<dyn Bridge> = Arc::new(bridge);
        match self.bridges.iter().position(|b| b.name() == bridge.name()) {
            Some(idx) => self.bridges[idx] = bridge,
            None => self.bridges.push(bridge),
        }
    }

    pub fn bridges(&self) -> &[Arc<dyn Bridge>] {
        &self.bridges
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Bridge>> {
        self.bridges.iter().find(|b| b.name() == name)
    }

    /// Sub-registry containing only bridges of the given kind
    pub fn of_kind(&self, kind: BridgeKind) -> Self {
        Self {
            bridges: self
                .bridges
                .iter()
                .filter(|b| b.kind() == kind)
                .cloned()
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.bridges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bridges.is_empty()
    }
}
