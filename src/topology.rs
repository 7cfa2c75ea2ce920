//! Address resolution and the dial plan of a fully connected bus mesh.
//!
//! Every participant listens on its own address and dials a subset of the
//! others so that, across all positions, every unordered pair is connected
//! exactly once. Everyone dials the positions after their own, except that
//! the ring is closed in reverse: the last position dials position 0 and
//! position 0 skips the last.

const PLACEHOLDER: &str = "%d";

/// Indicates an invalid mesh description.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum TopologyError {
    /// The address template must contain the position placeholder exactly
    /// once.
    #[error("Address template must contain exactly one %d placeholder, found {0}")]
    PlaceholderCount(usize),

    /// A bus needs the timed sender and at least one receiver.
    #[error("Participant count must be at least 2, got {0}")]
    TooFewParticipants(usize),
}

/// The resolved address list of a bus mesh, one entry per participant
/// position.
///
/// Position 0 is the timed sender; positions 1 and up are receiver workers.
/// The list is immutable once resolved and is shared by value (or behind an
/// `Arc`) with every participant thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    addresses: Vec<String>,
}

impl Topology {
    /// Substitutes each position into `template` to produce one address per
    /// participant.
    ///
    /// ```
    /// use busbar::topology::Topology;
    ///
    /// let topology = Topology::resolve("udp://localhost:300%d", 3)?;
    /// assert_eq!(topology.address(2), "udp://localhost:3002");
    /// # Ok::<(), busbar::topology::TopologyError>(())
    /// ```
    pub fn resolve(template: &str, participants: usize) -> Result<Self, TopologyError> {
        let placeholders = template.matches(PLACEHOLDER).count();
        if placeholders != 1 {
            return Err(TopologyError::PlaceholderCount(placeholders));
        }
        if participants < 2 {
            return Err(TopologyError::TooFewParticipants(participants));
        }

        let addresses = (0..participants)
            .map(|position| template.replacen(PLACEHOLDER, &position.to_string(), 1))
            .collect();
        Ok(Self { addresses })
    }

    pub fn participants(&self) -> usize {
        self.addresses.len()
    }

    pub fn address(&self, position: usize) -> &str {
        &self.addresses[position]
    }

    /// The positions `position` must dial.
    ///
    /// Dialing happens after every participant has started listening; the
    /// plan only closes each pair once, it does not order the dials.
    pub fn dial_plan(&self, position: usize) -> Vec<usize> {
        let last = self.addresses.len() - 1;
        if position == 0 {
            (1..last).collect()
        } else if position < last {
            (position + 1..=last).collect()
        } else {
            vec![0]
        }
    }
}
