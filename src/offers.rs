//! Promotional channels an affiliate link can target.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Offer {
    Coin,
    SuperDeals,
    LimitedOffers,
    BigSave,
}

impl Offer {
    /// Every offer, in the order replies list them.
    pub const ALL: [Offer; 4] = [
        Offer::Coin,
        Offer::SuperDeals,
        Offer::LimitedOffers,
        Offer::BigSave,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Offer::Coin => "coin",
            Offer::SuperDeals => "super",
            Offer::LimitedOffers => "limited",
            Offer::BigSave => "bigsave",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Offer::Coin => "🪙 Coin",
            Offer::SuperDeals => "🔥 Super Deals",
            Offer::LimitedOffers => "⏳ Limited Offers",
            Offer::BigSave => "💰 Big Save",
        }
    }

    /// Query parameters appended to the product URL, in order.
    pub fn params(self) -> [(&'static str, &'static str); 3] {
        let (source_type, channel) = match self {
            Offer::Coin => ("620", "coin"),
            Offer::SuperDeals => ("562", "sd"),
            Offer::LimitedOffers => ("561", "limitedoffers"),
            Offer::BigSave => ("680", "bigSave"),
        };
        [
            ("sourceType", source_type),
            ("channel", channel),
            ("afSmartRedirect", "y"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offer_order_and_keys() {
        let keys: Vec<&str> = Offer::ALL.iter().map(|o| o.key()).collect();
        assert_eq!(keys, vec!["coin", "super", "limited", "bigsave"]);
    }

    #[test]
    fn test_offer_params() {
        assert_eq!(
            Offer::BigSave.params(),
            [("sourceType", "680"), ("channel", "bigSave"), ("afSmartRedirect", "y")]
        );
        assert_eq!(Offer::SuperDeals.params()[1], ("channel", "sd"));
    }
}
