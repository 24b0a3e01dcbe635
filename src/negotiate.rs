//! Content negotiation collaborator.
//!
//! The request facade asks a [`Negotiator`] which of the offered values best
//! matches an `Accept*` header. The application can swap the implementation
//! with [`App::negotiator`](crate::App::negotiator). [`AcceptHeader`] is the
//! default: q-values, `*` and `type/*` wildcards, and earlier offers winning
//! ties.

/// Picks the best offered value for an `Accept`-style header.
pub trait Negotiator: Send + Sync + 'static {
    /// Returns the preferred entry of `offered`, or `None` if none is
    /// acceptable. A missing header accepts the first offer.
    fn negotiate<'o>(&self, header: Option<&str>, offered: &[&'o str]) -> Option<&'o str>;
}

/// The default [`Negotiator`].
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptHeader;

struct Range<'h> {
    value: &'h str,
    q: f32,
    order: usize,
}

impl Range<'_> {
    /// Higher is more specific: exact match beats `type/*` beats `*`.
    fn specificity(&self, offer: &str) -> Option<u8> {
        if self.value == "*" || self.value == "*/*" {
            return Some(0);
        }
        if self.value.eq_ignore_ascii_case(offer) {
            return Some(2);
        }
        let prefix = self.value.strip_suffix("/*")?;
        let (offer_type, _) = offer.split_once('/')?;
        offer_type.eq_ignore_ascii_case(prefix).then_some(1)
    }
}

fn parse(header: &str) -> Vec<Range<'_>> {
    header
        .split(',')
        .enumerate()
        .filter_map(|(order, part)| {
            let mut params = part.split(';');
            let value = params.next()?.trim();
            if value.is_empty() {
                return None;
            }
            let q = params
                .filter_map(|p| p.trim().strip_prefix("q="))
                .find_map(|q| q.trim().parse::<f32>().ok())
                .unwrap_or(1.0);
            Some(Range { value, q, order })
        })
        .collect()
}

impl Negotiator for AcceptHeader {
    fn negotiate<'o>(&self, header: Option<&str>, offered: &[&'o str]) -> Option<&'o str> {
        let Some(header) = header else {
            return offered.first().copied();
        };
        let ranges = parse(header);

        let mut best: Option<(f32, u8, usize, usize)> = None;
        for (offer_idx, offer) in offered.iter().enumerate() {
            // The most specific matching range decides this offer's quality.
            let matched = ranges
                .iter()
                .filter_map(|r| r.specificity(offer).map(|s| (r, s)))
                .max_by(|(a, sa), (b, sb)| sa.cmp(sb).then(b.order.cmp(&a.order)));
            let Some((range, specificity)) = matched else { continue };
            if range.q <= 0.0 {
                continue;
            }
            let candidate = (range.q, specificity, range.order, offer_idx);
            let better = match best {
                None => true,
                Some((q, s, order, idx)) => {
                    candidate.0 > q
                        || (candidate.0 == q && candidate.1 > s)
                        || (candidate.0 == q && candidate.1 == s && (candidate.2, candidate.3) < (order, idx))
                }
            };
            if better {
                best = Some(candidate);
            }
        }
        best.map(|(_, _, _, idx)| offered[idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_header_accepts_first_offer() {
        assert_eq!(AcceptHeader.negotiate(None, &["text/html", "application/json"]), Some("text/html"));
        assert_eq!(AcceptHeader.negotiate(None, &[]), None);
    }

    #[test]
    fn q_values_rank_offers() {
        let header = Some("text/html;q=0.5, application/json");
        assert_eq!(
            AcceptHeader.negotiate(header, &["text/html", "application/json"]),
            Some("application/json"),
        );
    }

    #[test]
    fn wildcards() {
        assert_eq!(AcceptHeader.negotiate(Some("image/*"), &["text/plain", "image/png"]), Some("image/png"));
        assert_eq!(AcceptHeader.negotiate(Some("*/*"), &["text/plain"]), Some("text/plain"));
    }

    #[test]
    fn q_zero_refuses() {
        assert_eq!(AcceptHeader.negotiate(Some("gzip;q=0, identity"), &["gzip"]), None);
        assert_eq!(AcceptHeader.negotiate(Some("*, gzip;q=0"), &["gzip", "br"]), Some("br"));
    }

    #[test]
    fn plain_tokens() {
        assert_eq!(AcceptHeader.negotiate(Some("en-US, fr;q=0.8"), &["fr", "en-US"]), Some("en-US"));
    }
}
