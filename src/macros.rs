/// Build an ordered attribute map ([`Record`](crate::Record))
///
/// Keys keep their written order, which is also the column order of the
/// INSERT they end up in.
///
/// ```
/// use lucid::record;
///
/// let row = record! { "name" => "ada", "age" => 36 };
/// assert_eq!(row.keys().collect::<Vec<_>>(), vec!["name", "age"]);
/// ```
#[macro_export]
macro_rules! record {
    () => {
        $crate::Record::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut record = $crate::Record::new();
        $(
            record.insert(
                ::std::string::String::from($key),
                $crate::sea_query::Value::from($value),
            );
        )+
        record
    }};
}

/// Forward fluent `Query` methods from a wrapper holding it in `self.query`
macro_rules! delegate_query {
    ($($(#[$meta:meta])* fn $name:ident($($arg:ident: $ty:ty),*);)+) => {
        $(
            $(#[$meta])*
            pub fn $name(mut self, $($arg: $ty),*) -> Self {
                self.query = self.query.$name($($arg),*);
                self
            }
        )+
    };
}

pub(crate) use delegate_query;
