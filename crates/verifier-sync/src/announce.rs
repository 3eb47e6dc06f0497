//! Tip announcements over pub/sub
//!
//! Every node periodically publishes the newest record of each eligible
//! signer it holds. A receiver that does not know an announced id starts a
//! sync session for that signer with the announcing peer.

use std::collections::BTreeSet;
use verifier_core::{Address, OptimismSignature};
use verifier_network::{Envelope, SignatureExchange, StreamTransport};

use crate::context::SyncContext;
use crate::error::Result;

/// Current tips of eligible signers, ordered by signer.
///
/// At most `max_announced_signers` tips are returned, keeping the most
/// recently extended chains. Extra data is stripped so the payload stays
/// within the gossip message limit.
pub fn latest_tips(ctx: &SyncContext) -> Vec<OptimismSignature> {
    let mut tips: Vec<OptimismSignature> = ctx
        .log
        .latest_per_signer()
        .into_iter()
        .filter(|tip| ctx.signers.is_eligible(&tip.signer))
        .collect();
    let cap = ctx.config.max_announced_signers.max(1);
    if tips.len() > cap {
        tips.sort_by(|a, b| b.id.cmp(&a.id));
        tips.truncate(cap);
    }
    for tip in &mut tips {
        tip.extra_data.clear();
    }
    tips.sort_by_key(|tip| tip.signer);
    tips
}

/// Publish the current tips; returns how many were announced
pub async fn publish_latest<T: StreamTransport>(ctx: &SyncContext, transport: &T) -> Result<usize> {
    let tips = latest_tips(ctx);
    if tips.is_empty() {
        return Ok(0);
    }
    let count = tips.len();
    let data = Envelope::announcement(tips).encode()?;
    transport.publish(data).await?;
    ctx.stats.write().announcements_published += 1;
    tracing::debug!("Published {} signer tips", count);
    Ok(count)
}

/// Signers in an announcement worth syncing: eligible and not yet known here
pub fn signers_to_sync(ctx: &SyncContext, latests: &[OptimismSignature]) -> Vec<Address> {
    latests
        .iter()
        .filter(|tip| ctx.signers.is_eligible(&tip.signer))
        .filter(|tip| !ctx.log.contains(&tip.id))
        .map(|tip| tip.signer)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Decode an announcement payload; anything else on the topic yields `None`
pub fn decode_announcement(data: &[u8]) -> Option<Vec<OptimismSignature>> {
    match Envelope::decode(data) {
        Ok(Envelope::SignatureExchange(SignatureExchange {
            latests: Some(latests),
            ..
        })) => Some(latests),
        Ok(other) => {
            tracing::debug!("Ignoring {} on announcement topic", other.kind());
            None
        }
        Err(e) => {
            tracing::debug!("Undecodable announcement: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use verifier_core::{SignatureId, H256};
    use verifier_storage::{Link, NewSignature, SignatureLog};

    use crate::config::SyncConfig;
    use crate::signer_set::SignerSet;

    struct Only(Address);

    impl SignerSet for Only {
        fn is_eligible(&self, signer: &Address) -> bool {
            *signer == self.0
        }

        fn stake(&self, _signer: &Address) -> u64 {
            1
        }
    }

    fn save(log: &SignatureLog, signer: u8, index: u64) -> OptimismSignature {
        log.save(NewSignature {
            id: None,
            link: Link::Auto,
            signer: Address::new([signer; 20]),
            scc: Address::new([0xcc; 20]),
            batch_index: index,
            batch_root: H256::ZERO,
            batch_size: 1,
            prev_total_elements: 0,
            extra_data: vec![],
            approved: true,
            signature: vec![],
        })
        .unwrap()
    }

    #[test]
    fn test_tips_filtered_and_sorted() {
        let log = Arc::new(SignatureLog::in_memory());
        save(&log, 3, 0);
        let tip3 = save(&log, 3, 1);
        let tip1 = save(&log, 1, 0);
        save(&log, 2, 0);

        let ctx = SyncContext::permissive(log.clone(), SyncConfig::default());
        let tips = latest_tips(&ctx);
        assert_eq!(tips.len(), 3);
        assert_eq!(tips[0], tip1);
        assert_eq!(tips[2], tip3);

        let restricted = SyncContext::new(
            log,
            Arc::new(verifier_core::AcceptAll),
            Arc::new(Only(Address::new([3; 20]))),
            SyncConfig::default(),
        );
        assert_eq!(latest_tips(&restricted), vec![tip3]);
    }

    #[test]
    fn test_announcement_is_capped_to_newest_tips() {
        let log = Arc::new(SignatureLog::in_memory());
        for signer in 1..=5u8 {
            save(&log, signer, 0);
        }
        let newest: Vec<Address> = {
            let mut tips = log.latest_per_signer();
            tips.sort_by(|a, b| b.id.cmp(&a.id));
            let mut signers: Vec<Address> = tips.iter().take(2).map(|t| t.signer).collect();
            signers.sort();
            signers
        };

        let config = SyncConfig {
            max_announced_signers: 2,
            ..Default::default()
        };
        let ctx = SyncContext::permissive(log, config);
        let tips = latest_tips(&ctx);
        assert_eq!(tips.len(), 2);
        assert_eq!(tips.iter().map(|t| t.signer).collect::<Vec<_>>(), newest);
    }

    #[test]
    fn test_announced_tips_carry_no_extra_data() {
        let log = Arc::new(SignatureLog::in_memory());
        let mut new = NewSignature::from_remote(save(&log, 1, 0));
        new.extra_data = vec![0xee; 4096];
        let stored = log.save(new).unwrap();
        assert_eq!(stored.extra_data.len(), 4096);

        let ctx = SyncContext::permissive(log, SyncConfig::default());
        let tips = latest_tips(&ctx);
        assert_eq!(tips[0].id, stored.id);
        assert!(tips[0].extra_data.is_empty());
    }

    #[test]
    fn test_known_tips_are_not_synced() {
        let log = Arc::new(SignatureLog::in_memory());
        let known = save(&log, 1, 0);
        let ctx = SyncContext::permissive(log, SyncConfig::default());

        let mut unknown = known.clone();
        unknown.id = SignatureId::from_parts(known.id.timestamp_ms() + 5, 0);
        unknown.signer = Address::new([2; 20]);

        let wanted = signers_to_sync(&ctx, &[known, unknown.clone(), unknown]);
        assert_eq!(wanted, vec![Address::new([2; 20])]);
    }

    #[test]
    fn test_decode_announcement_ignores_other_envelopes() {
        let bytes = Envelope::Eom.encode().unwrap();
        assert!(decode_announcement(&bytes).is_none());
        assert!(decode_announcement(&[0xde, 0xad]).is_none());

        let bytes = Envelope::announcement(vec![]).encode().unwrap();
        assert_eq!(decode_announcement(&bytes), Some(vec![]));
    }
}
