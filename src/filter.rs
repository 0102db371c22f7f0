use bytes::Bytes;
use once_cell::sync::Lazy;
use pest::{
    error::ErrorVariant,
    iterators::{Pair, Pairs},
    Parser,
};
use pest_derive::Parser;
use rasn::prelude::*;
use rasn_ldap::{AttributeValueAssertion, Filter, MatchingRuleAssertion, SubstringChoice, SubstringFilter};
use regex::Regex;

use crate::error::Error;

type RulePair<'a> = Pair<'a, Rule>;
type RulePairs<'a> = Pairs<'a, Rule>;

/// Decode `\xx` hex escapes of an assertion value into raw bytes
fn unescape(s: &str) -> Vec<u8> {
    static HEX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"\\([\da-fA-F]{2})"#).unwrap());

    let mut out = Vec::with_capacity(s.len());
    let mut last = 0;
    for caps in HEX_RE.captures_iter(s) {
        let (Some(whole), Ok(byte)) = (caps.get(0), u8::from_str_radix(&caps[1], 16)) else {
            continue;
        };
        out.extend_from_slice(s[last..whole.start()].as_bytes());
        out.push(byte);
        last = whole.end();
    }
    out.extend_from_slice(s[last..].as_bytes());
    out
}

#[derive(Parser)]
#[grammar = "filter.pest"]
pub(crate) struct FilterParser;

/// Parse a string filter such as `(&(objectClass=person)(cn=Ali*))`
pub(crate) fn parse_filter<S: AsRef<str>>(filter: S) -> Result<Filter, Error> {
    let mut parsed = FilterParser::parse(Rule::rfc2254, filter.as_ref())?;
    match parsed.next() {
        Some(pair) => parse_rule(pair),
        None => Err(Error::InvalidResponse),
    }
}

fn unexpected(pair: &RulePair) -> Error {
    pest::error::Error::new_from_span(
        ErrorVariant::CustomError {
            message: format!("unexpected {:?}", pair.as_rule()),
        },
        pair.as_span(),
    )
    .into()
}

fn as_bytes(pair: &RulePair) -> Bytes {
    Bytes::copy_from_slice(pair.as_str().as_bytes())
}

fn as_value(pair: &RulePair) -> Bytes {
    unescape(pair.as_str()).into()
}

fn as_inner<'a>(pair: RulePair<'a>) -> Result<RulePair<'a>, Error> {
    let outer = pair.clone();
    pair.into_inner().next().ok_or_else(|| unexpected(&outer))
}

fn parse_rule(pair: RulePair) -> Result<Filter, Error> {
    Ok(match pair.as_rule() {
        Rule::and => Filter::And(parse_set(pair.into_inner())?),
        Rule::or => Filter::Or(parse_set(pair.into_inner())?),
        Rule::not => Filter::Not(Box::new(parse_rule(as_inner(pair)?)?)),
        Rule::simple => parse_simple(pair)?,
        Rule::present => Filter::Present(as_bytes(&as_inner(pair)?)),
        Rule::substring => parse_substring(pair)?,
        Rule::extensible => parse_extensible(pair)?,
        _ => return Err(unexpected(&pair)),
    })
}

fn parse_extensible(pair: RulePair) -> Result<Filter, Error> {
    let mut assertion = MatchingRuleAssertion::new(None, None, Bytes::default(), false);
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::ruleid => assertion.matching_rule = Some(as_bytes(&inner)),
            Rule::ident => assertion.r#type = Some(as_bytes(&inner)),
            Rule::string => assertion.match_value = as_value(&inner),
            Rule::dnattr => assertion.dn_attributes = true,
            _ => return Err(unexpected(&inner)),
        }
    }
    Ok(Filter::ExtensibleMatch(assertion))
}

fn parse_substring(pair: RulePair) -> Result<Filter, Error> {
    let outer = pair.clone();
    let mut pairs = pair.into_inner();
    let attr = pairs.next().map(|p| as_bytes(&p)).ok_or_else(|| unexpected(&outer))?;
    let choices = pairs
        .map(|inner| match inner.as_rule() {
            Rule::initial => Ok(SubstringChoice::Initial(as_value(&inner))),
            Rule::any => Ok(SubstringChoice::Any(as_value(&inner))),
            Rule::final_ => Ok(SubstringChoice::Final(as_value(&inner))),
            _ => Err(unexpected(&inner)),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Filter::Substrings(SubstringFilter::new(attr, choices)))
}

fn parse_simple(pair: RulePair) -> Result<Filter, Error> {
    let outer = pair.clone();
    let pairs = pair.into_inner().collect::<Vec<_>>();
    let [attr, op, value] = &pairs[..] else {
        return Err(unexpected(&outer));
    };
    let assertion = AttributeValueAssertion::new(as_bytes(attr), as_value(value));
    Ok(match op.as_rule() {
        Rule::equal => Filter::EqualityMatch(assertion),
        Rule::approx => Filter::ApproxMatch(assertion),
        Rule::greater => Filter::GreaterOrEqual(assertion),
        Rule::less => Filter::LessOrEqual(assertion),
        _ => return Err(unexpected(op)),
    })
}

#[allow(clippy::mutable_key_type)]
fn parse_set(pairs: RulePairs) -> Result<SetOf<Filter>, Error> {
    pairs.map(parse_rule).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eq(attr: &str, value: &[u8]) -> Filter {
        Filter::EqualityMatch(AttributeValueAssertion::new(
            Bytes::copy_from_slice(attr.as_bytes()),
            Bytes::copy_from_slice(value),
        ))
    }

    #[test]
    fn test_parser() {
        let test_filters = vec![
            ("(cn=Babs Jensen\\30\\30\\01)", eq("cn", b"Babs Jensen00\x01")),
            ("(cn=Babs Jensen)", eq("cn", b"Babs Jensen")),
            ("(cn=a\\2ab)", eq("cn", b"a*b")),
            ("(photo=\\00\\ff)", eq("photo", b"\x00\xff")),
            ("(cn=*)", Filter::Present("cn".into())),
            ("(!(cn=Tim Howes))", Filter::Not(Box::new(eq("cn", b"Tim Howes")))),
            (
                "(uidNumber>=1000)",
                Filter::GreaterOrEqual(AttributeValueAssertion::new("uidNumber".into(), "1000".into())),
            ),
            (
                "(sn~=Jensen)",
                Filter::ApproxMatch(AttributeValueAssertion::new("sn".into(), "Jensen".into())),
            ),
            (
                "(&(objectClass=Person)(|(sn=Jensen)(cn=Babs J*)))",
                Filter::And(
                    [
                        eq("objectClass", b"Person"),
                        Filter::Or(
                            [
                                eq("sn", b"Jensen"),
                                Filter::Substrings(SubstringFilter::new(
                                    "cn".into(),
                                    vec![SubstringChoice::Initial("Babs J".into())],
                                )),
                            ]
                            .into_iter()
                            .collect(),
                        ),
                    ]
                    .into_iter()
                    .collect(),
                ),
            ),
            (
                "(o=univ*of*mich*end)",
                Filter::Substrings(SubstringFilter::new(
                    "o".into(),
                    vec![
                        SubstringChoice::Initial("univ".into()),
                        SubstringChoice::Any("of".into()),
                        SubstringChoice::Any("mich".into()),
                        SubstringChoice::Final("end".into()),
                    ],
                )),
            ),
            (
                "(mail=*@example.com)",
                Filter::Substrings(SubstringFilter::new(
                    "mail".into(),
                    vec![SubstringChoice::Final("@example.com".into())],
                )),
            ),
            (
                "(cn:1.2.3.4.5:=Fred Flintstone)",
                Filter::ExtensibleMatch(MatchingRuleAssertion::new(
                    Some("1.2.3.4.5".into()),
                    Some("cn".into()),
                    "Fred Flintstone".into(),
                    false,
                )),
            ),
            (
                "(sn:dn:2.4.6.8.10:=Barney Rubble)",
                Filter::ExtensibleMatch(MatchingRuleAssertion::new(
                    Some("2.4.6.8.10".into()),
                    Some("sn".into()),
                    "Barney Rubble".into(),
                    true,
                )),
            ),
            (
                "(o:dn:=Ace Industry)",
                Filter::ExtensibleMatch(MatchingRuleAssertion::new(
                    None,
                    Some("o".into()),
                    "Ace Industry".into(),
                    true,
                )),
            ),
            (
                "(:dn:2.4.6.8.10:=Dino)",
                Filter::ExtensibleMatch(MatchingRuleAssertion::new(
                    Some("2.4.6.8.10".into()),
                    None,
                    "Dino".into(),
                    true,
                )),
            ),
        ];

        for (text, expected) in test_filters {
            assert_eq!(parse_filter(text).unwrap(), expected, "filter {}", text);
        }
    }

    #[test]
    fn test_invalid_filters() {
        for text in ["", "cn=x", "(cn=x", "(&)", "((cn=x))", "(cn=x)(sn=y)"] {
            assert!(
                matches!(parse_filter(text), Err(Error::InvalidFilter(_))),
                "filter {:?} should be rejected",
                text
            );
        }
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape(r#"hello\20\77\6f\72\6c\64\00\01"#), b"hello world\x00\x01");
        assert_eq!(unescape(r#"hello\\gg"#), b"hello\\\\gg");
        assert_eq!(unescape(r#"\ff\FE"#), b"\xff\xfe");
    }
}
