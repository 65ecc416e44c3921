use std::fmt::{self, Display};

const HEADER_TAG: &str = "I";

/// The shape of a network: its input size and the `(out, in)` pair of every layer.
///
/// Rendered as a weight file header, `I_<layers>_<input>[_<out>_<in>]*`, which is what a
/// persisted network is checked against before loading it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topology {
    input_size: usize,
    layers: Vec<(usize, usize)>,
}

impl Topology {
    /// Creates a new `Topology`.
    ///
    /// # Arguments
    /// * `input_size` - The amount of inputs of the network.
    /// * `layers` - The `(out, in)` pair of every layer, in order.
    pub fn new(input_size: usize, layers: Vec<(usize, usize)>) -> Self {
        Self { input_size, layers }
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn layers(&self) -> &[(usize, usize)] {
        &self.layers
    }

    /// Renders the topology as a weight file header line, without the line break.
    pub fn header(&self) -> String {
        self.to_string()
    }

    /// Parses a header line.
    ///
    /// # Arguments
    /// * `line` - The header, without the line break.
    ///
    /// # Returns
    /// The topology it describes, or the reason it isn't a valid header.
    pub fn parse_header(line: &str) -> Result<Self, String> {
        let mut fields = line.split('_');

        if fields.next() != Some(HEADER_TAG) {
            return Err(format!("a header starts with `{HEADER_TAG}_`"));
        }

        let numbers = fields
            .map(|field| {
                field
                    .parse::<usize>()
                    .map_err(|e| format!("bad header field {field:?}: {e}"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let [count, input_size, pairs @ ..] = numbers.as_slice() else {
            return Err("a header needs a layer count and an input size".into());
        };

        if count.checked_mul(2) != Some(pairs.len()) {
            return Err(format!(
                "header announces {count} layers but describes {} values",
                pairs.len()
            ));
        }

        let layers = pairs.chunks_exact(2).map(|p| (p[0], p[1])).collect();
        Ok(Self::new(*input_size, layers))
    }
}

impl Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{HEADER_TAG}_{}_{}", self.layers.len(), self.input_size)?;

        for (out, inp) in &self.layers {
            write!(f, "_{out}_{inp}")?;
        }

        Ok(())
    }
}
