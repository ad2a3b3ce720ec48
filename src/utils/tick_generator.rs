// src/utils/tick_generator.rs
use crate::types::Tick;
use crate::utils::precision::normalize_price;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

const PRICE_TICK: Decimal = Decimal::from_parts(1, 0, 0, false, 4);
const PRICE_FLOOR: Decimal = Decimal::from_parts(5, 0, 0, false, 0);

/// Random-walk tick source with trending runs, pauses and reversals.
pub struct RandomTickGenerator {
    rng: StdRng,
    symbol: String,
    trade_price: Decimal,
    move_duration: u32,
    direction: i8,
}

impl RandomTickGenerator {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self::with_rng(symbol, StdRng::from_entropy())
    }

    /// Reproducible sequence for tests and replays.
    pub fn seeded(symbol: impl Into<String>, seed: u64) -> Self {
        Self::with_rng(symbol, StdRng::seed_from_u64(seed))
    }

    fn with_rng(symbol: impl Into<String>, rng: StdRng) -> Self {
        let mut generator = Self {
            rng,
            symbol: symbol.into(),
            trade_price: Decimal::ZERO,
            move_duration: 0,
            direction: 1,
        };
        generator.reset();
        generator
    }

    pub fn reset(&mut self) {
        self.trade_price = Decimal::from(self.rng.gen_range(0..100) + 5);
        self.move_duration = self.rng.gen_range(0..10) * 5;
        self.direction = 1;
    }

    fn advance(&mut self) {
        if self.move_duration <= 1 {
            self.direction = if self.rng.gen_bool(0.5) { -1 } else { 1 };
            self.move_duration = self.rng.gen_range(0..10) * 5;
        } else {
            self.move_duration -= 1;
        }

        if self.rng.gen_bool(0.15) {
            self.direction = -self.direction;
        } else if self.rng.gen_bool(0.12) {
            self.direction = 0;
        }

        if self.trade_price < PRICE_FLOOR && self.direction == -1 {
            self.direction = 1;
        }

        let mut local_direction = self.direction;
        if self.rng.gen_bool(0.10) {
            local_direction = -local_direction;
        }

        let fraction = Decimal::from_f64(self.rng.gen::<f64>()).unwrap_or(Decimal::ZERO);
        let distance = self.trade_price * fraction * Decimal::from(3) / Decimal::ONE_HUNDRED
            * Decimal::from(local_direction);

        self.trade_price = normalize_price(self.trade_price + distance, PRICE_TICK);
    }

    pub fn next_tick(&mut self) -> Tick {
        self.advance();
        Tick::new(
            self.symbol.clone(),
            self.trade_price,
            self.trade_price - Decimal::ONE,
            self.trade_price + Decimal::ONE,
            Decimal::from(self.rng.gen_range(1..1_000)),
        )
    }
}
