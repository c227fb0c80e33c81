//! Treatment/control assignment over the doubled ("2i") product catalog.
//!
//! Every product `p` in the control half `[0, N/2)` has a shadow identity
//! `p + N/2` in the treatment half `[N/2, N)`. Treatment assignment maps each
//! product of a batch to the treatment-half identity the balance regularizer
//! compares it against.

use serde::{Deserialize, Serialize};

use crate::data::Interaction;
use crate::error::TrainError;

/// Catalog dimensions after the 2i doubling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    num_users: u32,
    num_products: u32,
}

impl Catalog {
    /// Build a catalog from the configured sizes, doubling the product count
    /// to reserve the shadow id range.
    pub fn doubled(num_users: usize, num_products: usize) -> Result<Self, TrainError> {
        let doubled = num_products
            .checked_mul(2)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| {
                TrainError::config(format!("num_products={num_products} overflows the id space"))
            })?;
        let num_users = u32::try_from(num_users)
            .map_err(|_| TrainError::config(format!("num_users={num_users} overflows the id space")))?;
        Ok(Self {
            num_users,
            num_products: doubled,
        })
    }

    /// Number of users.
    pub fn num_users(&self) -> u32 {
        self.num_users
    }

    /// Product count after doubling (`N`).
    pub fn num_products(&self) -> u32 {
        self.num_products
    }

    /// Partition boundary `N/2`. Ids at or above it are treatment.
    pub fn threshold(&self) -> u32 {
        self.num_products / 2
    }

    /// Whether `product` falls in the treatment half.
    pub fn is_treatment(&self, product: u32) -> bool {
        product >= self.threshold()
    }

    /// Check that every record's user and product lie inside the catalog.
    pub fn validate_records(&self, records: &[Interaction], source: &str) -> Result<(), TrainError> {
        for (row, r) in records.iter().enumerate() {
            if r.user >= self.num_users {
                return Err(TrainError::config(format!(
                    "{source} row {row}: user id {} >= num_users {}",
                    r.user, self.num_users
                )));
            }
            if r.product >= self.num_products {
                return Err(TrainError::config(format!(
                    "{source} row {row}: product id {} >= doubled num_products {}",
                    r.product, self.num_products
                )));
            }
        }
        Ok(())
    }

    /// Check that every product lies in the control half `[0, N/2)`.
    ///
    /// The test split needs this: its shifted bootstrap pass adds `N/2` to
    /// each id.
    pub fn validate_control_half(
        &self,
        records: &[Interaction],
        source: &str,
    ) -> Result<(), TrainError> {
        match records.iter().position(|r| self.is_treatment(r.product)) {
            Some(row) => Err(TrainError::config(format!(
                "{source} row {row}: product id {} is in the treatment half [{}, {}); \
                 the shifted evaluation pass needs control ids only",
                records[row].product,
                self.threshold(),
                self.num_products
            ))),
            None => Ok(()),
        }
    }
}

/// Treatment id for a single product.
///
/// Treatment-half products map to themselves; control-half products map to
/// their shadow identity `p + N/2`.
pub fn treatment_id(product: u32, catalog: &Catalog) -> Result<u32, TrainError> {
    if product >= catalog.num_products {
        return Err(TrainError::ProductOutOfRange {
            id: product,
            num_products: catalog.num_products,
        });
    }
    if catalog.is_treatment(product) {
        Ok(product)
    } else {
        Ok(product + catalog.threshold())
    }
}

/// Treatment ids for a batch, element-wise and order-preserving.
pub fn treatment_ids(products: &[u32], catalog: &Catalog) -> Result<Vec<u32>, TrainError> {
    products.iter().map(|&p| treatment_id(p, catalog)).collect()
}

/// Shift every id by `N/2` to address the complementary population.
///
/// Used for the second bootstrap pass. Ids already in the treatment half
/// would leave the catalog and are rejected.
pub fn shift_to_counterpart(products: &[u32], catalog: &Catalog) -> Result<Vec<u32>, TrainError> {
    let offset = catalog.threshold();
    products
        .iter()
        .map(|&p| {
            let shifted = p.checked_add(offset).unwrap_or(u32::MAX);
            if shifted >= catalog.num_products {
                Err(TrainError::ProductOutOfRange {
                    id: shifted,
                    num_products: catalog.num_products,
                })
            } else {
                Ok(shifted)
            }
        })
        .collect()
}
