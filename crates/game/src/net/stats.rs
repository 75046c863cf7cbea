use rand::Rng;
use rand::rngs::SmallRng;

#[derive(Debug, Clone, Default)]
pub struct NetworkStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    /// Datagrams whose tail was discarded by the codec.
    pub decode_errors: u64,
    /// Outgoing packets dropped by the loss simulation.
    pub simulated_drops: u64,
}

/// Outgoing packet-loss injection for soak tests and the server's
/// `--loss-percent` flag. Reliability must hold up under this.
#[derive(Debug, Clone, Copy, Default)]
pub struct PacketLossSimulation {
    pub enabled: bool,
    pub loss_percent: f32,
}

impl PacketLossSimulation {
    pub fn with_loss(loss_percent: f32) -> Self {
        Self {
            enabled: loss_percent > 0.0,
            loss_percent,
        }
    }

    pub fn should_drop(&self, rng: &mut SmallRng) -> bool {
        if !self.enabled || self.loss_percent <= 0.0 {
            return false;
        }
        rng.gen_range(0.0..100.0) < self.loss_percent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn disabled_simulation_never_drops() {
        let mut rng = SmallRng::seed_from_u64(1);
        let sim = PacketLossSimulation::default();
        assert!((0..100).all(|_| !sim.should_drop(&mut rng)));
    }

    #[test]
    fn full_loss_always_drops() {
        let mut rng = SmallRng::seed_from_u64(1);
        let sim = PacketLossSimulation::with_loss(100.0);
        assert!((0..100).all(|_| sim.should_drop(&mut rng)));
    }
}
