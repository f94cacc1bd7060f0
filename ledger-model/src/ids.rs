use derive_more::Display;
use serde::{Deserialize, Serialize};

macro_rules! stable_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Copy,
            Clone,
            Eq,
            PartialEq,
            Ord,
            PartialOrd,
            Hash,
            Deserialize,
            Serialize,
            Display,
        )]
        #[display("{}({_0})", stringify!($name))]
        pub struct $name(pub u64);

        impl $name {
            pub fn new(id: u64) -> Self {
                Self(id)
            }
        }
    };
}

stable_id!(TickerId);
stable_id!(BrokerId);
stable_id!(BrokerAccountId);
stable_id!(BankAccountId);
stable_id!(MovementId);

pub use ledger_money::CurrencyId;
