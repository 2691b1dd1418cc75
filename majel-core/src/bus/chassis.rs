//! Eight-slot chassis wiring cards to the static port map.

use super::ports::{decode_port, Channel, FLOATING_BUS, SLOT_COUNT};
use super::{Backplane, Card};

/// Backplane populated with up to eight cards.
#[derive(Default)]
pub struct Chassis {
    slots: [Option<Box<dyn Card>>; SLOT_COUNT],
}

impl Chassis {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plug a card into a slot, returning whatever was there before.
    /// Out-of-range slots hand the card straight back.
    pub fn insert(&mut self, slot: u8, card: Box<dyn Card>) -> Option<Box<dyn Card>> {
        match self.slots.get_mut(slot as usize) {
            Some(entry) => entry.replace(card),
            None => Some(card),
        }
    }

    /// Pull the card out of a slot.
    pub fn remove(&mut self, slot: u8) -> Option<Box<dyn Card>> {
        self.slots.get_mut(slot as usize).and_then(|s| s.take())
    }

    /// Card in a slot.
    pub fn card(&self, slot: u8) -> Option<&dyn Card> {
        self.slots.get(slot as usize).and_then(|s| s.as_deref())
    }

    /// Mutable card in a slot.
    pub fn card_mut(&mut self, slot: u8) -> Option<&mut (dyn Card + 'static)> {
        self.slots.get_mut(slot as usize).and_then(|s| s.as_deref_mut())
    }

    /// Occupied slot numbers, lowest first.
    pub fn occupied(&self) -> Vec<u8> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|_| i as u8))
            .collect()
    }
}

impl Backplane for Chassis {
    fn output(&mut self, port: u8, value: u8) {
        let Some((slot, channel)) = decode_port(port) else {
            return;
        };
        if let Some(card) = self.card_mut(slot) {
            match channel {
                Channel::Command => card.command(value),
                Channel::Data => card.write_data(value),
            }
        }
    }

    fn input(&mut self, port: u8) -> u8 {
        let Some((slot, channel)) = decode_port(port) else {
            return FLOATING_BUS;
        };
        match (self.card_mut(slot), channel) {
            (Some(card), Channel::Data) => card.read_data(),
            // Command ports are write-only
            _ => FLOATING_BUS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::StubCard;

    #[test]
    fn test_empty_chassis_floats() {
        let mut chassis = Chassis::new();
        assert_eq!(chassis.input(0xF0), FLOATING_BUS);
        assert_eq!(chassis.input(0x00), FLOATING_BUS);
        assert!(chassis.occupied().is_empty());
    }

    #[test]
    fn test_insert_and_remove() {
        let mut chassis = Chassis::new();
        assert!(chassis.insert(2, Box::new(StubCard::new(0x30))).is_none());
        assert!(chassis.insert(9, Box::new(StubCard::new(0x31))).is_some());
        assert_eq!(chassis.occupied(), vec![2]);
        assert_eq!(chassis.card(2).map(|c| c.name()), Some("stub"));

        assert!(chassis.remove(2).is_some());
        assert!(chassis.card(2).is_none());
    }

    #[test]
    fn test_ports_reach_the_right_slot() {
        let mut chassis = Chassis::new();
        chassis.insert(5, Box::new(StubCard::new(0x42)));

        // Slot 5: data 0xFA, command 0xFB
        chassis.output(0xFB, 0xFE);
        assert_eq!(chassis.input(0xFA), 0xAA);
        assert_eq!(chassis.input(0xFA), 0x55);
        assert_eq!(chassis.input(0xFA), 0x42);

        // Neighbouring slot sees nothing
        chassis.output(0xF9, 0xFE);
        assert_eq!(chassis.input(0xF8), FLOATING_BUS);
    }
}
