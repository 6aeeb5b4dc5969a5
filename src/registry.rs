//! Stream headers of a read response.

use crate::error::{Error, Result};
use crate::selection::Selector;
use crate::types::StreamHeader;

/// The static list of streams a read response carries, in server order.
#[derive(Clone, Debug, Default)]
pub struct StreamRegistry {
    headers: Vec<StreamHeader>,
}

impl StreamRegistry {
    /// Create a registry from the response's header block.
    pub fn new(headers: Vec<StreamHeader>) -> Self {
        Self { headers }
    }

    /// All streams, in the order the server listed them.
    pub fn get_all(&self) -> &[StreamHeader] {
        &self.headers
    }

    /// Streams matching `selector`, in server order.
    pub fn find(&self, selector: &Selector) -> Vec<&StreamHeader> {
        self.headers.iter().filter(|h| selector.matches(h)).collect()
    }

    /// The one stream matching `selector`.
    ///
    /// Fails with [`Error::NoResult`] when nothing matches and
    /// [`Error::TooManyResults`] when several streams do.
    pub fn get_one(&self, selector: &Selector) -> Result<&StreamHeader> {
        let mut matches = self.find(selector);
        match matches.len() {
            0 => Err(Error::NoResult),
            1 => Ok(matches.remove(0)),
            count => Err(Error::TooManyResults { count }),
        }
    }

    /// Number of streams.
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Returns true if the response carries no stream.
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}
