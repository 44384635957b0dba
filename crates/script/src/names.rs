//! Decoding and building of name-operation locking scripts.
//!
//! A name output prefixes an ordinary address script with one of:
//!
//! ```text
//! OP_1 <hash>               OP_2DROP            (pre-commitment)
//! OP_2 <name> <rand> <value> OP_2DROP OP_2DROP  (first update, old style)
//! OP_2 <name> <value>        OP_2DROP OP_DROP   (first update, new style)
//! OP_3 <name> <value>        OP_2DROP OP_DROP   (update)
//! ```

use crate::{read_push, write_push, OP_1, OP_2, OP_2DROP, OP_3, OP_DROP};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NameOp {
    /// Hashed pre-commitment to a future registration.
    NameNew { hash: Vec<u8> },
    /// Registration.  `rand` is the disclosed salt for the old-style
    /// commit/reveal flow; `None` marks a new-style direct registration.
    NameFirstUpdate {
        name: Vec<u8>,
        rand: Option<Vec<u8>>,
        value: Vec<u8>,
    },
    /// Value change of an existing name.
    NameUpdate { name: Vec<u8>, value: Vec<u8> },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NameScript {
    pub op: NameOp,
    /// The address script following the name prefix.
    pub address: Vec<u8>,
}

impl NameScript {
    /// Classifies a locking script.  Anything that does not match one of the
    /// name shapes exactly decodes to `None`, including truncated scripts.
    pub fn parse(script: &[u8]) -> Option<Self> {
        match *script.first()? {
            OP_1 => {
                let (hash, pos) = read_push(script, 1)?;
                if script.get(pos).copied()? != OP_2DROP {
                    return None;
                }
                Some(Self {
                    op: NameOp::NameNew {
                        hash: hash.to_vec(),
                    },
                    address: script[pos + 1..].to_vec(),
                })
            }
            OP_2 => {
                let (name, pos) = read_push(script, 1)?;
                let (second, pos) = read_push(script, pos)?;
                if let Some((third, after)) = read_push(script, pos) {
                    // Old style: name, rand, value, then two 2DROPs.
                    if script.get(after..after + 2)? != [OP_2DROP, OP_2DROP] {
                        return None;
                    }
                    Some(Self {
                        op: NameOp::NameFirstUpdate {
                            name: name.to_vec(),
                            rand: Some(second.to_vec()),
                            value: third.to_vec(),
                        },
                        address: script[after + 2..].to_vec(),
                    })
                } else {
                    if script.get(pos..pos + 2)? != [OP_2DROP, OP_DROP] {
                        return None;
                    }
                    Some(Self {
                        op: NameOp::NameFirstUpdate {
                            name: name.to_vec(),
                            rand: None,
                            value: second.to_vec(),
                        },
                        address: script[pos + 2..].to_vec(),
                    })
                }
            }
            OP_3 => {
                let (name, pos) = read_push(script, 1)?;
                let (value, pos) = read_push(script, pos)?;
                if script.get(pos..pos + 2)? != [OP_2DROP, OP_DROP] {
                    return None;
                }
                Some(Self {
                    op: NameOp::NameUpdate {
                        name: name.to_vec(),
                        value: value.to_vec(),
                    },
                    address: script[pos + 2..].to_vec(),
                })
            }
            _ => None,
        }
    }

    /// Whether this operation writes a name record (first update or update).
    pub fn is_any_update(&self) -> bool {
        matches!(
            self.op,
            NameOp::NameFirstUpdate { .. } | NameOp::NameUpdate { .. }
        )
    }

    pub fn is_new_style_registration(&self) -> bool {
        matches!(self.op, NameOp::NameFirstUpdate { rand: None, .. })
    }

    /// The operated-on name; `None` for a pre-commitment.
    pub fn name(&self) -> Option<&[u8]> {
        match &self.op {
            NameOp::NameNew { .. } => None,
            NameOp::NameFirstUpdate { name, .. } | NameOp::NameUpdate { name, .. } => {
                Some(name.as_slice())
            }
        }
    }

    pub fn value(&self) -> Option<&[u8]> {
        match &self.op {
            NameOp::NameNew { .. } => None,
            NameOp::NameFirstUpdate { value, .. } | NameOp::NameUpdate { value, .. } => {
                Some(value.as_slice())
            }
        }
    }

    pub fn new_hash(&self) -> Option<&[u8]> {
        match &self.op {
            NameOp::NameNew { hash } => Some(hash.as_slice()),
            _ => None,
        }
    }
}

pub fn build_name_new(address: &[u8], hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(address.len() + 23);
    script.push(OP_1);
    write_push(&mut script, hash);
    script.push(OP_2DROP);
    script.extend_from_slice(address);
    script
}

pub fn build_name_first_update(
    address: &[u8],
    name: &[u8],
    rand: Option<&[u8]>,
    value: &[u8],
) -> Vec<u8> {
    let mut script = Vec::new();
    script.push(OP_2);
    write_push(&mut script, name);
    match rand {
        Some(rand) => {
            write_push(&mut script, rand);
            write_push(&mut script, value);
            script.push(OP_2DROP);
            script.push(OP_2DROP);
        }
        None => {
            write_push(&mut script, value);
            script.push(OP_2DROP);
            script.push(OP_DROP);
        }
    }
    script.extend_from_slice(address);
    script
}

pub fn build_name_update(address: &[u8], name: &[u8], value: &[u8]) -> Vec<u8> {
    let mut script = Vec::new();
    script.push(OP_3);
    write_push(&mut script, name);
    write_push(&mut script, value);
    script.push(OP_2DROP);
    script.push(OP_DROP);
    script.extend_from_slice(address);
    script
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p2pkh(tag: u8) -> Vec<u8> {
        let mut script = Vec::with_capacity(25);
        script.extend_from_slice(&[0x76, 0xa9, 0x14]);
        script.extend_from_slice(&[tag; 20]);
        script.extend_from_slice(&[0x88, 0xac]);
        script
    }

    #[test]
    fn name_new_round_trip() {
        let addr = p2pkh(1);
        let script = build_name_new(&addr, &[0x42; 20]);
        let parsed = NameScript::parse(&script).expect("name new");
        assert_eq!(parsed.new_hash(), Some(&[0x42u8; 20][..]));
        assert_eq!(parsed.address, addr);
        assert!(!parsed.is_any_update());
        assert_eq!(parsed.name(), None);
    }

    #[test]
    fn first_update_old_style_round_trip() {
        let addr = p2pkh(2);
        let script = build_name_first_update(&addr, b"alice", Some(b"salt"), b"value");
        let parsed = NameScript::parse(&script).expect("first update");
        assert!(parsed.is_any_update());
        assert!(!parsed.is_new_style_registration());
        assert_eq!(parsed.name(), Some(&b"alice"[..]));
        assert_eq!(parsed.value(), Some(&b"value"[..]));
        assert_eq!(parsed.address, addr);
        match parsed.op {
            NameOp::NameFirstUpdate { rand, .. } => assert_eq!(rand.as_deref(), Some(&b"salt"[..])),
            other => panic!("unexpected op {other:?}"),
        }
    }

    #[test]
    fn first_update_new_style_round_trip() {
        let addr = p2pkh(3);
        let script = build_name_first_update(&addr, b"bob", None, b"value");
        let parsed = NameScript::parse(&script).expect("first update");
        assert!(parsed.is_new_style_registration());
        assert_eq!(parsed.name(), Some(&b"bob"[..]));
        assert_eq!(parsed.address, addr);
    }

    #[test]
    fn update_round_trip() {
        let addr = p2pkh(4);
        let script = build_name_update(&addr, b"carol", b"v2");
        let parsed = NameScript::parse(&script).expect("update");
        assert!(parsed.is_any_update());
        assert!(matches!(parsed.op, NameOp::NameUpdate { .. }));
        assert_eq!(parsed.value(), Some(&b"v2"[..]));
        assert_eq!(parsed.address, addr);
    }

    #[test]
    fn non_name_scripts_decode_to_none() {
        assert_eq!(NameScript::parse(&[]), None);
        assert_eq!(NameScript::parse(&p2pkh(5)), None);
        // Tag opcode with a truncated push.
        assert_eq!(NameScript::parse(&[OP_1, 0x14, 0x00]), None);
        // Missing the drop opcodes.
        let mut script = vec![OP_3];
        write_push(&mut script, b"x");
        write_push(&mut script, b"y");
        assert_eq!(NameScript::parse(&script), None);
    }

    #[test]
    fn large_value_uses_pushdata() {
        let value = vec![0xaa; 600];
        let script = build_name_first_update(&p2pkh(6), b"big", None, &value);
        let parsed = NameScript::parse(&script).expect("first update");
        assert_eq!(parsed.value(), Some(&value[..]));
    }
}
