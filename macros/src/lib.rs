extern crate proc_macro;

use core::{fmt::Display, ops::RangeInclusive, str::FromStr};
use proc_macro::TokenStream;

use proc_macro2::Span;
use quote::quote;
use syn::{
    parse::{self, Parse, ParseStream},
    parse_macro_input,
    punctuated::Punctuated,
    Ident, LitBool, LitInt, Token, Type,
};

#[proc_macro]
pub fn recorder(input: TokenStream) -> TokenStream {
    match main(parse_macro_input!(input as Input)) {
        Ok(ts) => ts,
        Err(e) => e.to_compile_error().into(),
    }
}

fn main(input: Input) -> parse::Result<TokenStream> {
    let mut timer: Option<Type> = None;
    let mut words: Option<(u32, Span)> = None;
    let mut fmt_id_bits: Option<(u32, Span)> = None;
    let mut max_subpackets: Option<(u32, Span)> = None;
    let mut timestamp_shift: Option<(u32, Span)> = None;
    let mut filtering: Option<(bool, Span)> = None;
    let mut filter_lockout: Option<(bool, Span)> = None;
    let mut single_shot: Option<(bool, Span)> = None;
    let mut long_timestamp: Option<(bool, Span)> = None;
    let mut deferred_timestamp: Option<(bool, Span)> = None;
    let mut discard_oversize: Option<(bool, Span)> = None;
    let mut compact: Option<(bool, Span)> = None;

    for field in &input.fields {
        let name = field.name.to_string();
        let span = field.name.span();

        fn duplicate<T>(slot: &Option<T>, name: &str, span: Span) -> parse::Result<()> {
            if slot.is_some() {
                return Err(parse::Error::new(
                    span,
                    format!("`{}` appears more than once", name),
                ));
            }

            Ok(())
        }

        match &*name {
            "timer" => {
                duplicate(&timer, &name, span)?;
                timer = Some(field.type_value()?.clone());
            }

            "words" => {
                duplicate(&words, &name, span)?;
                // the upper bound only guards the `words + 4` array length
                words = Some((lit2ux::<u32>(field.int_value()?, Some(20..=0x0FFF_FFFF))?, span));
            }

            "fmt_id_bits" => {
                duplicate(&fmt_id_bits, &name, span)?;
                fmt_id_bits = Some((lit2ux::<u32>(field.int_value()?, Some(9..=16))?, span));
            }

            "max_subpackets" => {
                duplicate(&max_subpackets, &name, span)?;
                max_subpackets = Some((lit2ux::<u32>(field.int_value()?, Some(1..=256))?, span));
            }

            "timestamp_shift" => {
                duplicate(&timestamp_shift, &name, span)?;
                timestamp_shift = Some((lit2ux::<u32>(field.int_value()?, Some(1..=16))?, span));
            }

            "filtering" => {
                duplicate(&filtering, &name, span)?;
                filtering = Some((field.bool_value()?, span));
            }

            "filter_lockout" => {
                duplicate(&filter_lockout, &name, span)?;
                filter_lockout = Some((field.bool_value()?, span));
            }

            "single_shot" => {
                duplicate(&single_shot, &name, span)?;
                single_shot = Some((field.bool_value()?, span));
            }

            "long_timestamp" => {
                duplicate(&long_timestamp, &name, span)?;
                long_timestamp = Some((field.bool_value()?, span));
            }

            "deferred_timestamp" => {
                duplicate(&deferred_timestamp, &name, span)?;
                deferred_timestamp = Some((field.bool_value()?, span));
            }

            "discard_oversize" => {
                duplicate(&discard_oversize, &name, span)?;
                discard_oversize = Some((field.bool_value()?, span));
            }

            "compact" => {
                duplicate(&compact, &name, span)?;
                compact = Some((field.bool_value()?, span));
            }

            _ => {
                return Err(parse::Error::new(
                    span,
                    format!("unknown field `{}`", name),
                ))
            }
        }
    }

    let timer =
        timer.ok_or_else(|| parse::Error::new(Span::call_site(), "`timer` must be specified"))?;
    let (words, words_span) =
        words.ok_or_else(|| parse::Error::new(Span::call_site(), "`words` must be specified"))?;
    let (fmt_id_bits, _) = fmt_id_bits.unwrap_or((10, Span::call_site()));
    let (max_subpackets, _) = max_subpackets.unwrap_or((16, Span::call_site()));
    let (timestamp_shift, shift_span) = timestamp_shift.unwrap_or((1, Span::call_site()));
    let filtering = filtering.map(|(v, _)| v).unwrap_or(true);
    let single_shot = single_shot.unwrap_or((false, Span::call_site()));
    let filter_lockout = filter_lockout.unwrap_or((filtering, Span::call_site()));

    if timestamp_shift > 31 - fmt_id_bits {
        return Err(parse::Error::new(
            shift_span,
            "`timestamp_shift` must not exceed 31 - fmt_id_bits",
        ));
    }

    if words < max_subpackets * 20 {
        return Err(parse::Error::new(
            words_span,
            "the buffer must hold at least four maximal messages (words >= max_subpackets * 20)",
        ));
    }

    if single_shot.0 && !filtering {
        return Err(parse::Error::new(
            single_shot.1,
            "single-shot logging is only available when message filtering is enabled",
        ));
    }

    if filter_lockout.0 && !filtering {
        return Err(parse::Error::new(
            filter_lockout.1,
            "the filter lockout is only available when message filtering is enabled",
        ));
    }

    let single_shot = single_shot.0;
    let filter_lockout = filter_lockout.0;
    let long_timestamp = long_timestamp.map(|(v, _)| v).unwrap_or(true);
    let deferred_timestamp = deferred_timestamp.map(|(v, _)| v).unwrap_or(true);
    let discard_oversize = discard_oversize.map(|(v, _)| v).unwrap_or(true);
    let compact = compact.map(|(v, _)| v).unwrap_or(false);

    let total = (words + 4) as usize;

    let wide = if long_timestamp {
        Some(quote!(
            static __WEIR_WIDE: weir::timestamp::WideTime = weir::timestamp::WideTime::new();
        ))
    } else {
        None
    };

    let long_timestamp_body = if long_timestamp {
        Some(quote!(
            __WEIR_WIDE.log::<__WeirConfig, __WeirTimer>(__weir_recorder());
        ))
    } else {
        None
    };

    Ok(quote!(
        const WEIR: () = {
            struct __WeirConfig;

            impl weir::Config for __WeirConfig {
                const BUFFER_WORDS: u32 = #words;
                const FMT_ID_BITS: u32 = #fmt_id_bits;
                const MAX_SUBPACKETS: u32 = #max_subpackets;
                const TIMESTAMP_SHIFT: u32 = #timestamp_shift;
                const FILTERING: bool = #filtering;
                const FILTER_LOCKOUT: bool = #filter_lockout;
                const SINGLE_SHOT: bool = #single_shot;
                const LONG_TIMESTAMP: bool = #long_timestamp;
                const DEFERRED_TIMESTAMP: bool = #deferred_timestamp;
                const DISCARD_OVERSIZE: bool = #discard_oversize;
                const COMPACT: bool = #compact;
            }

            type __WeirTimer = #timer;

            static __WEIR: weir::Inner<[u32; #total]> = weir::Inner::new([0; #total]);

            #wide

            #[no_mangle]
            fn __weir_recorder() -> &'static weir::Inner<[u32]> {
                &__WEIR
            }

            #[no_mangle]
            fn __weir_init(initial_filter: u32, mode: weir::InitMode) {
                __weir_recorder().init::<__WeirConfig, __WeirTimer>(initial_filter, mode)
            }

            #[no_mangle]
            fn __weir_set_filter(filter: u32) {
                __weir_recorder().set_filter::<__WeirConfig>(filter)
            }

            #[no_mangle]
            fn __weir_restore_filter() {
                __weir_recorder().restore_filter()
            }

            #[no_mangle]
            fn __weir_get_filter() -> u32 {
                __weir_recorder().get_filter()
            }

            #[no_mangle]
            fn __weir_timestamp_frequency(hz: u32) {
                __weir_recorder().timestamp_frequency::<__WeirConfig, __WeirTimer>(hz)
            }

            #[no_mangle]
            fn __weir_long_timestamp() {
                #long_timestamp_body
            }

            #[no_mangle]
            fn __weir_msg0(key: weir::Key) {
                __weir_recorder().msg0::<__WeirConfig, __WeirTimer>(key)
            }

            #[no_mangle]
            fn __weir_msg1(key: weir::Key, data1: u32) {
                __weir_recorder().msg1::<__WeirConfig, __WeirTimer>(key, data1)
            }

            #[no_mangle]
            fn __weir_msg2(key: weir::Key, data1: u32, data2: u32) {
                __weir_recorder().msg2::<__WeirConfig, __WeirTimer>(key, data1, data2)
            }

            #[no_mangle]
            fn __weir_msg3(key: weir::Key, data1: u32, data2: u32, data3: u32) {
                __weir_recorder().msg3::<__WeirConfig, __WeirTimer>(key, data1, data2, data3)
            }

            #[no_mangle]
            fn __weir_msg4(key: weir::Key, data1: u32, data2: u32, data3: u32, data4: u32) {
                __weir_recorder().msg4::<__WeirConfig, __WeirTimer>(key, data1, data2, data3, data4)
            }

            #[no_mangle]
            fn __weir_msgn(key: weir::Key, data: &[u8]) {
                __weir_recorder().msgn::<__WeirConfig, __WeirTimer>(key, data)
            }

            #[no_mangle]
            fn __weir_msgx(key: weir::Key, data: &[u8]) {
                __weir_recorder().msgx::<__WeirConfig, __WeirTimer>(key, data)
            }

            #[no_mangle]
            fn __weir_stringn(key: weir::Key, s: &[u8], max_length: u32) {
                __weir_recorder().stringn::<__WeirConfig, __WeirTimer>(key, s, max_length)
            }
        };
    )
    .into())
}

impl Field {
    fn int_value(&self) -> parse::Result<&LitInt> {
        match &self.value {
            Value::Int(lit) => Ok(lit),
            _ => Err(parse::Error::new(
                self.name.span(),
                format!("`{}` expects an integer literal", self.name),
            )),
        }
    }

    fn bool_value(&self) -> parse::Result<bool> {
        match &self.value {
            Value::Bool(lit) => Ok(lit.value),
            _ => Err(parse::Error::new(
                self.name.span(),
                format!("`{}` expects `true` or `false`", self.name),
            )),
        }
    }

    fn type_value(&self) -> parse::Result<&Type> {
        match &self.value {
            Value::Type(ty) => Ok(ty),
            _ => Err(parse::Error::new(
                self.name.span(),
                format!("`{}` expects a type path", self.name),
            )),
        }
    }
}

fn lit2ux<T>(lit: &LitInt, range: Option<RangeInclusive<T>>) -> parse::Result<T>
where
    T: Copy + Display + FromStr + PartialOrd<T>,
    <T as FromStr>::Err: Display,
{
    if !lit.suffix().is_empty() {
        return Err(parse::Error::new(lit.span(), "literal must be unsuffixed"));
    }

    let n = lit.base10_parse()?;
    if let Some(range) = range {
        if n < *range.start() || n > *range.end() {
            return Err(parse::Error::new(
                lit.span(),
                format!(
                    "literal must be in the range {}..={}",
                    range.start(),
                    range.end()
                ),
            ));
        }
    }

    Ok(n)
}

struct Input {
    fields: Punctuated<Field, Token![,]>,
}

impl Parse for Input {
    fn parse(input: ParseStream) -> parse::Result<Self> {
        Ok(Self {
            fields: Punctuated::parse_terminated(input)?,
        })
    }
}

struct Field {
    name: Ident,
    _colon: Token![:],
    value: Value,
}

impl Parse for Field {
    fn parse(input: ParseStream) -> parse::Result<Self> {
        Ok(Self {
            name: input.parse()?,
            _colon: input.parse()?,
            value: input.parse()?,
        })
    }
}

enum Value {
    Int(LitInt),
    Bool(LitBool),
    Type(Type),
}

impl Parse for Value {
    fn parse(input: ParseStream) -> parse::Result<Self> {
        if input.peek(LitInt) {
            Ok(Value::Int(input.parse()?))
        } else if input.peek(LitBool) {
            Ok(Value::Bool(input.parse()?))
        } else {
            Ok(Value::Type(input.parse()?))
        }
    }
}
