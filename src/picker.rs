use rand::Rng;

/// Metadata-URI selection seam, invoked once per newly allocated
/// identifier. The weight distribution's source format stays external.
pub trait UriPicker: Send + Sync {
    fn pick_uri(&self) -> String;
}

/// Always returns the same URI. Deterministic test double.
#[derive(Clone, Debug)]
pub struct FixedPicker {
    uri: String,
}

impl FixedPicker {
    #[must_use]
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }
}

impl UriPicker for FixedPicker {
    fn pick_uri(&self) -> String {
        self.uri.clone()
    }
}

/// Weighted-random choice over `(uri, weight)` pairs via a cumulative draw.
#[derive(Clone, Debug)]
pub struct WeightedPicker {
    choices: Vec<(String, u64)>,
    total: u64,
}

impl WeightedPicker {
    /// Zero-weight entries are kept but never drawn. Returns `None` when the
    /// total weight is zero.
    #[must_use]
    pub fn new(choices: Vec<(String, u64)>) -> Option<Self> {
        let total: u64 = choices.iter().map(|(_, w)| w).sum();
        if total == 0 {
            return None;
        }
        Some(Self { choices, total })
    }
}

impl UriPicker for WeightedPicker {
    fn pick_uri(&self) -> String {
        let mut draw = rand::thread_rng().gen_range(0..self.total);
        for (uri, weight) in &self.choices {
            if draw < *weight {
                return uri.clone();
            }
            draw -= weight;
        }
        // Unreachable for total > 0; fall back to the last entry.
        self.choices[self.choices.len() - 1].0.clone()
    }
}
