use std::collections::{BTreeSet, HashMap};

/// Label text -> bit index, assigned in first-seen order
#[derive(Debug, Clone, Default)]
pub struct LabelVocabulary {
    indices: HashMap<String, usize>,
    labels: Vec<String>,
}

impl LabelVocabulary {
    pub fn new() -> Self {
        LabelVocabulary::default()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn index_of(&mut self, label: &str) -> usize {
        if let Some(&idx) = self.indices.get(label) {
            return idx;
        }
        let idx = self.labels.len();
        self.indices.insert(label.to_string(), idx);
        self.labels.push(label.to_string());
        idx
    }

    /// `(bit, label)` pairs in bit order
    pub fn entries(&self) -> impl Iterator<Item = (usize, &str)> {
        self.labels.iter().enumerate().map(|(i, l)| (i, l.as_str()))
    }

    /// Encode a comma-separated label list at the current vocabulary width.
    /// An empty list still renders one zero, so padding can tell it apart
    /// from an absent value.
    pub fn encode(&mut self, raw: &str) -> String {
        let bits: BTreeSet<usize> = raw
            .split(',')
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|l| self.index_of(l))
            .collect();
        render_bits(&bits, self.len().max(1))
    }
}

/// Bit `i` is the `i`-th character from the right
pub fn render_bits(bits: &BTreeSet<usize>, width: usize) -> String {
    let width = width.max(bits.iter().next_back().map_or(0, |b| b + 1));
    (0..width)
        .rev()
        .map(|i| if bits.contains(&i) { '1' } else { '0' })
        .collect()
}

/// Left-pad a bitstring with zeros up to `width`
pub fn pad_bits(bits: &str, width: usize) -> String {
    if bits.len() >= width {
        return bits.to_string();
    }
    let mut padded = "0".repeat(width - bits.len());
    padded.push_str(bits);
    padded
}
