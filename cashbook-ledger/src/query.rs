use cashbook_core::{CurrencyCode, PartyId, Transaction};

/// Equality filters describing which transaction records to load.
#[derive(Clone, Debug, Default)]
pub struct TransactionQuery {
    /// Matches when the party is either giver or taker.
    pub party: Option<PartyId>,
    pub giver: Option<PartyId>,
    pub taker: Option<PartyId>,
    pub currency: Option<CurrencyCode>,
    pub is_exchange: Option<bool>,
    pub limit: Option<usize>,
    pub ascending: bool,
}

impl TransactionQuery {
    pub fn with_party(mut self, party: PartyId) -> Self {
        self.party = Some(party);
        self
    }

    pub fn with_giver(mut self, giver: PartyId) -> Self {
        self.giver = Some(giver);
        self
    }

    pub fn with_taker(mut self, taker: PartyId) -> Self {
        self.taker = Some(taker);
        self
    }

    pub fn with_currency(mut self, currency: CurrencyCode) -> Self {
        self.currency = Some(currency);
        self
    }

    pub fn exchanges_only(mut self) -> Self {
        self.is_exchange = Some(true);
        self
    }

    pub fn transfers_only(mut self) -> Self {
        self.is_exchange = Some(false);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn ascending(mut self) -> Self {
        self.ascending = true;
        self
    }

    /// In-process evaluation of the filters, ignoring limit and ordering.
    pub fn matches(&self, tx: &Transaction) -> bool {
        if let Some(party) = &self.party {
            if !tx.involves(party) {
                return false;
            }
        }
        if let Some(giver) = &self.giver {
            if &tx.giver.id != giver {
                return false;
            }
        }
        if let Some(taker) = &self.taker {
            if &tx.taker.id != taker {
                return false;
            }
        }
        if let Some(currency) = &self.currency {
            if &tx.currency != currency {
                return false;
            }
        }
        if let Some(flag) = self.is_exchange {
            if tx.is_exchange() != flag {
                return false;
            }
        }
        true
    }
}
