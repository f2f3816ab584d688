use crate::config::SessionPolicy;
use rand::Rng;
use rand::seq::IndexedRandom;
use rigex_core::{Cue, DistanceCondition, RewardSize, Side, TrialCard};
use tracing::debug;

/// Draws the card for each trial.
///
/// Reward size follows the block: block 1 makes the left port the large one,
/// block 2 the right, switching every `block_duration` drawn cards. After an
/// error trial the previous card is dealt again, at most `error_max` times in
/// a row.
pub struct CardDeck<R: Rng> {
    rng: R,
    cues: Vec<Cue>,
    distances: Vec<DistanceCondition>,
    block_duration: u32,
    block: u8,
    drawn_in_block: u32,
    error_max: u32,
    repeats: u32,
    current: Option<TrialCard>,
}

impl<R: Rng> CardDeck<R> {
    pub fn new(policy: &SessionPolicy, rng: R) -> Self {
        Self {
            rng,
            cues: policy.cues.clone(),
            distances: policy.distance_conditions.clone(),
            block_duration: policy.block_duration.max(1),
            block: if policy.initial_block == 2 { 2 } else { 1 },
            drawn_in_block: 0,
            error_max: policy.error_max,
            repeats: 0,
            current: None,
        }
    }

    pub fn block(&self) -> u8 {
        self.block
    }

    pub fn current(&self) -> Option<TrialCard> {
        self.current
    }

    fn large_side(&self) -> Side {
        if self.block == 1 { Side::Left } else { Side::Right }
    }

    pub fn next_card(&mut self, error_repeat: bool) -> TrialCard {
        if let Some(card) = self.current {
            if error_repeat && self.repeats < self.error_max {
                self.repeats += 1;
                debug!(repeats = self.repeats, "repeating card");
                return card;
            }
        }
        self.repeats = 0;

        if self.drawn_in_block >= self.block_duration {
            self.block = if self.block == 1 { 2 } else { 1 };
            self.drawn_in_block = 0;
            debug!(block = self.block, "block switch");
        }
        self.drawn_in_block += 1;

        let cue = self.cues.choose(&mut self.rng).copied().unwrap_or(Cue::Sound);
        let distance = self
            .distances
            .choose(&mut self.rng)
            .copied()
            .unwrap_or(DistanceCondition::Short);
        let side = if self.rng.random_bool(0.5) { Side::Left } else { Side::Right };
        let reward = if side == self.large_side() {
            RewardSize::Large
        } else {
            RewardSize::Small
        };
        let card = TrialCard::new(cue, distance, side, reward);
        self.current = Some(card);
        card
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn deck(error_max: u32, block_duration: u32) -> CardDeck<StdRng> {
        let policy = SessionPolicy {
            error_max,
            block_duration,
            ..SessionPolicy::default()
        };
        CardDeck::new(&policy, StdRng::seed_from_u64(3))
    }

    #[test]
    fn error_repeat_reuses_card_up_to_limit() {
        let mut d = deck(2, 30);
        let first = d.next_card(false);
        assert_eq!(d.next_card(true), first);
        assert_eq!(d.next_card(true), first);
        d.next_card(true);
        assert_eq!(d.repeats, 0);
    }

    #[test]
    fn blocks_alternate_large_side() {
        let mut d = deck(0, 4);
        for _ in 0..4 {
            let card = d.next_card(false);
            assert_eq!(card.reward == RewardSize::Large, card.correct_side == Side::Left);
        }
        assert_eq!(d.block(), 1);
        let card = d.next_card(false);
        assert_eq!(d.block(), 2);
        assert_eq!(card.reward == RewardSize::Large, card.correct_side == Side::Right);
    }

    #[test]
    fn draws_only_configured_conditions() {
        let policy = SessionPolicy {
            cues: vec![Cue::Led],
            distance_conditions: vec![DistanceCondition::Long],
            ..SessionPolicy::default()
        };
        let mut d = CardDeck::new(&policy, StdRng::seed_from_u64(11));
        for _ in 0..20 {
            let card = d.next_card(false);
            assert_eq!(card.cue, Cue::Led);
            assert_eq!(card.distance, DistanceCondition::Long);
        }
    }
}
