//! CIP MSP batching planner (spec 4.6): 50-tag batches for connected
//! messaging, 20 for unconnected; a single tag skips MSP overhead.

const CONNECTED_BATCH_SIZE: usize = 50;
const UNCONNECTED_BATCH_SIZE: usize = 20;

pub enum Plan {
    /// a lone tag read/write bypasses MSP wrapping entirely.
    Single(usize),
    /// a batch of tag indices bundled into one Multiple Service Packet.
    Msp(Vec<usize>),
}

pub fn plan(count: usize, connected: bool) -> Vec<Plan> {
    if count == 0 {
        return Vec::new();
    }
    if count == 1 {
        return vec![Plan::Single(0)];
    }
    let batch_size = if connected { CONNECTED_BATCH_SIZE } else { UNCONNECTED_BATCH_SIZE };
    (0..count)
        .collect::<Vec<_>>()
        .chunks(batch_size)
        .map(|chunk| if chunk.len() == 1 { Plan::Single(chunk[0]) } else { Plan::Msp(chunk.to_vec()) })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_tag_skips_msp() {
        let plans = plan(1, true);
        assert!(matches!(plans.as_slice(), [Plan::Single(0)]));
    }

    #[test]
    fn connected_batches_of_fifty() {
        let plans = plan(120, true);
        assert_eq!(plans.len(), 3);
        match &plans[0] {
            Plan::Msp(indices) => assert_eq!(indices.len(), 50),
            _ => panic!("expected MSP batch"),
        }
        match &plans[2] {
            Plan::Msp(indices) => assert_eq!(indices.len(), 20),
            _ => panic!("expected MSP batch"),
        }
    }

    #[test]
    fn unconnected_batches_of_twenty() {
        let plans = plan(45, false);
        assert_eq!(plans.len(), 3);
    }
}
