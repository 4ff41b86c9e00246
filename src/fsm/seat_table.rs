/// The fixed pool of single-letter seat labels the original keyboard-hotkey table draws from;
/// a round exposes at most this many seats (§4.6, §6 key tables).
pub const SEAT_LETTERS: [&str; 6] = ["Q", "W", "E", "R", "T", "Y"];

/// One round's seats, in a fixed display order, each either open or claimed by a player name.
/// Shrinks by one seat at the end of every round that was not a tied vote (§4.6 round reset).
#[derive(Debug, Clone)]
pub struct SeatTable {
    seats: Vec<(String, Option<String>)>,
}

impl SeatTable {
    /// Builds a table with `num_seats` open seats, taken from [`SEAT_LETTERS`] in order.
    pub fn new(num_seats: usize) -> Self {
        let seats = SEAT_LETTERS
            .iter()
            .take(num_seats)
            .map(|letter| (letter.to_string(), None))
            .collect();
        Self { seats }
    }

    pub fn seats(&self) -> &[(String, Option<String>)] {
        &self.seats
    }

    pub fn seat_count(&self) -> usize {
        self.seats.len()
    }

    pub fn is_open(&self, seat: &str) -> bool {
        self.seats
            .iter()
            .find(|(label, _)| label == seat)
            .is_some_and(|(_, occupant)| occupant.is_none())
    }

    /// Assigns `seat` to `player`. No-op (returns `false`) if the seat does not exist or is
    /// already taken — callers must check [`SeatTable::is_open`] first to decide whether to
    /// ack or nak a claim.
    pub fn claim(&mut self, seat: &str, player: impl Into<String>) -> bool {
        match self.seats.iter_mut().find(|(label, _)| label == seat) {
            Some((_, occupant @ None)) => {
                *occupant = Some(player.into());
                true
            }
            _ => false,
        }
    }

    /// True once every seat has an occupant.
    pub fn all_taken(&self) -> bool {
        self.seats.iter().all(|(_, occupant)| occupant.is_some())
    }

    /// Clears every occupant, keeping the same seat count, for a fresh round after a tied vote.
    pub fn clear(&mut self) {
        for (_, occupant) in &mut self.seats {
            *occupant = None;
        }
    }

    /// Drops the last seat and clears every remaining occupant, for a fresh round after a
    /// decisive elimination (§4.6 `_reset_round`'s `d.popitem()` when the vote was not tied).
    pub fn shrink_and_clear(&mut self) {
        self.seats.pop();
        self.clear();
    }

    /// True once there is exactly one seat left to contend for — the edge case where a
    /// timestamp tie-break applies to protect an in-flight local claim (§4.6).
    pub fn is_final_seat(&self) -> bool {
        self.seats.len() == 1
    }
}

#[cfg(test)]
mod seat_table_tests {
    use super::*;

    #[test]
    fn test_new_table_has_requested_open_seats() {
        let t = SeatTable::new(3);
        assert_eq!(t.seat_count(), 3);
        assert!(!t.all_taken());
        assert_eq!(t.seats()[0].0, "Q");
    }

    #[test]
    fn test_claim_open_seat_succeeds_once() {
        let mut t = SeatTable::new(2);
        assert!(t.claim("Q", "alice"));
        assert!(!t.claim("Q", "bob"));
        assert!(!t.is_open("Q"));
    }

    #[test]
    fn test_claim_unknown_seat_fails() {
        let mut t = SeatTable::new(1);
        assert!(!t.claim("Z", "alice"));
    }

    #[test]
    fn test_all_taken_once_every_seat_filled() {
        let mut t = SeatTable::new(2);
        t.claim("Q", "alice");
        assert!(!t.all_taken());
        t.claim("W", "bob");
        assert!(t.all_taken());
    }

    #[test]
    fn test_shrink_and_clear_drops_last_seat() {
        let mut t = SeatTable::new(3);
        t.claim("Q", "alice");
        t.shrink_and_clear();
        assert_eq!(t.seat_count(), 2);
        assert!(t.is_open("Q"));
    }

    #[test]
    fn test_is_final_seat() {
        let t = SeatTable::new(1);
        assert!(t.is_final_seat());
        let t = SeatTable::new(2);
        assert!(!t.is_final_seat());
    }
}
