use super::{BundleEntry, BundleRequest, FinalizedBundle, Tag, Transaction};
use crate::crypto::{sha256, Address, SigningScheme, FRAGMENT_LEN};
use crate::error::BundleError;

/// Lays out and finalizes bundles. Nothing is emitted unless every transfer
/// and input validates and the inputs cover the outputs.
pub struct BundleBuilder<'a> {
    scheme: &'a dyn SigningScheme,
}

impl<'a> BundleBuilder<'a> {
    pub fn new(scheme: &'a dyn SigningScheme) -> Self {
        Self { scheme }
    }

    pub fn build(&self, request: &BundleRequest) -> Result<FinalizedBundle, BundleError> {
        if request.transfers.is_empty() {
            return Err(BundleError::EmptyTransfers);
        }
        let timestamp = request
            .timestamp
            .unwrap_or_else(|| chrono::Utc::now().timestamp().max(0) as u64);

        let mut total_output: u64 = 0;
        let mut entries = Vec::with_capacity(request.transfers.len() + request.inputs.len() + 1);

        for transfer in &request.transfers {
            let address = if transfer.value != 0 {
                Address::parse_checked(&transfer.address)?
            } else {
                Address::parse(&transfer.address)?
            };
            let message = transfer.message.as_bytes();
            if message.len() > FRAGMENT_LEN {
                return Err(BundleError::MessageTooLong {
                    length: message.len(),
                    max: FRAGMENT_LEN,
                });
            }
            total_output = checked_total(total_output, transfer.value)?;
            entries.push(BundleEntry {
                address,
                value: signed(transfer.value)?,
                length: 1,
                timestamp,
                tag: Tag::parse(&transfer.tag)?,
                message: message.to_vec(),
            });
        }

        let mut total_input: u64 = 0;
        let mut reserved_slots = 0;
        let first_input = (!request.inputs.is_empty()).then_some(entries.len());
        for input in &request.inputs {
            if input.balance == 0 {
                return Err(BundleError::EmptyInput {
                    key_index: input.key_index,
                });
            }
            let address = Address::parse_checked(&input.address)?;
            total_input = checked_total(total_input, input.balance)?;
            reserved_slots += input.security.fragments();
            entries.push(BundleEntry {
                address,
                value: -signed(input.balance)?,
                length: input.security.fragments(),
                timestamp,
                tag: Tag::default(),
                message: Vec::new(),
            });
        }

        if total_input < total_output {
            return Err(BundleError::InsufficientBalance {
                required: total_output,
                available: total_input,
            });
        }

        let surplus = total_input - total_output;
        if surplus > 0 {
            let remainder = request
                .remainder
                .ok_or(BundleError::MissingRemainderAddress { surplus })?;
            entries.push(BundleEntry {
                address: remainder,
                value: signed(surplus)?,
                length: 1,
                timestamp,
                tag: Tag::default(),
                message: Vec::new(),
            });
        }

        let transactions = entries
            .iter()
            .flat_map(|entry| (0..entry.length).map(move |slot| Transaction::from_entry(entry, slot)))
            .collect();

        Ok(self.finalize(transactions, first_input, reserved_slots))
    }

    /// Numbers the transactions and stamps the bundle hash. The first
    /// obsolete tag is bumped until the normalized hash is safe to sign.
    fn finalize(
        &self,
        mut transactions: Vec<Transaction>,
        first_input: Option<usize>,
        reserved_slots: usize,
    ) -> FinalizedBundle {
        let last_index = transactions.len() as u64 - 1;
        for (index, tx) in transactions.iter_mut().enumerate() {
            tx.current_index = index as u64;
            tx.last_index = last_index;
        }

        loop {
            let essence: Vec<u8> = transactions.iter().flat_map(|tx| tx.essence()).collect();
            let hash = sha256(&[&essence]);
            let normalized = self.scheme.normalize_hash(&hash);

            if normalized.is_insecure() {
                transactions[0].obsolete_tag.increment();
                continue;
            }

            for tx in transactions.iter_mut() {
                tx.bundle = hash;
            }
            return FinalizedBundle {
                transactions,
                hash,
                normalized,
                first_input,
                reserved_slots,
            };
        }
    }
}

fn checked_total(total: u64, value: u64) -> Result<u64, BundleError> {
    total
        .checked_add(value)
        .ok_or(BundleError::ValueOutOfRange { value })
}

fn signed(value: u64) -> Result<i64, BundleError> {
    i64::try_from(value).map_err(|_| BundleError::ValueOutOfRange { value })
}
