//! Column-level mappings between domain types and SQLite `TEXT` values.

use std::{fmt::Display, ops::Deref, str::FromStr};

use sqlx::{sqlite::SqliteValueRef, Sqlite};
use tss_bridge_primitives::{amount::Amount, deposit::WithdrawalStatus};

/// Amounts are kept as decimal strings since they exceed the range of SQLite integers.
pub(super) type DbAmount = TextColumn<Amount>;

/// Statuses are kept as their upper-case names.
pub(super) type DbWithdrawalStatus = TextColumn<WithdrawalStatus>;

/// A value stored through its [`Display`] form and read back with [`FromStr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct TextColumn<T>(T);

impl<T> Deref for TextColumn<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> From<T> for TextColumn<T> {
    fn from(value: T) -> Self {
        Self(value)
    }
}

impl<T> sqlx::Type<Sqlite> for TextColumn<T> {
    fn type_info() -> <Sqlite as sqlx::Database>::TypeInfo {
        <String as sqlx::Type<Sqlite>>::type_info()
    }

    fn compatible(ty: &<Sqlite as sqlx::Database>::TypeInfo) -> bool {
        <String as sqlx::Type<Sqlite>>::compatible(ty)
    }
}

impl<'r, T> sqlx::Decode<'r, Sqlite> for TextColumn<T>
where
    T: FromStr,
{
    fn decode(value: SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let raw = <&str as sqlx::Decode<'r, Sqlite>>::decode(value)?;
        raw.parse().map(Self).map_err(|_| {
            let ty = std::any::type_name::<T>();
            sqlx::Error::Decode(format!("column holds no valid {ty}: {raw}").into()).into()
        })
    }
}

impl<'q, T> sqlx::Encode<'q, Sqlite> for TextColumn<T>
where
    T: Display,
{
    fn encode_by_ref(
        &self,
        buf: &mut <Sqlite as sqlx::Database>::ArgumentBuffer<'q>,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<'q, Sqlite>>::encode(self.0.to_string(), buf)
    }
}
