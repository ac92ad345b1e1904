//! Standard security handler: password authentication and per-object
//! decryption for the `/Standard` encryption filter.
//!
//! Covers the revisions found in the wild:
//! - V1/R2: 40-bit RC4
//! - V2/R3: RC4 with keys up to 128 bits
//! - V4/R4: crypt filters (RC4 or AES-128)
//! - V5/R5, V5/R6: AES-256

use std::borrow::Cow;

use lopdf::{Dictionary, Object, ObjectId};
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::cipher::{aes_cbc_decrypt, aes_cbc_encrypt, rc4, unpad_pkcs7, AES_BLOCK};
use crate::error::DecryptError;

/// Password padding string used by the RC4-era key derivation.
pub const PASSWORD_PADDING: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

/// Cipher applied to a class of objects (strings or streams).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptMethod {
    Identity,
    Rc4,
    Aes128,
    Aes256,
}

/// Values read from the `/Encrypt` dictionary.
struct EncryptParams {
    revision: i64,
    key_len: usize,
    o: Vec<u8>,
    u: Vec<u8>,
    p: u32,
    doc_id: Vec<u8>,
    encrypt_metadata: bool,
}

/// An authenticated security handler holding the file encryption key.
#[derive(Debug, Clone)]
pub struct StandardSecurityHandler {
    key: Vec<u8>,
    revision: i64,
    string_method: CryptMethod,
    stream_method: CryptMethod,
    encrypt_metadata: bool,
}

impl StandardSecurityHandler {
    /// Establish the file key from `password`, trying it as the user
    /// password and then as the owner password.
    ///
    /// # Returns
    /// * `Err(WrongPassword)` if neither check passes
    /// * `Err(MalformedOrUnsupported)` for unknown filters, revisions or
    ///   missing entries
    pub fn authenticate(
        encrypt: &Dictionary,
        doc_id: &[u8],
        password: &str,
    ) -> Result<Self, DecryptError> {
        let filter = encrypt
            .get(b"Filter")
            .and_then(Object::as_name)
            .map_err(|_| unsupported("missing /Filter in /Encrypt"))?;
        if filter != b"Standard" {
            return Err(unsupported(format!(
                "unsupported security handler /{}",
                String::from_utf8_lossy(filter)
            )));
        }

        let v = get_int_or(encrypt, b"V", 0);
        let r = get_int(encrypt, b"R")?;

        match (v, r) {
            (1 | 2, 2 | 3) => {
                let key_len = if r == 2 {
                    5
                } else {
                    legacy_key_length(get_int_or(encrypt, b"Length", 40))?
                };
                let params = EncryptParams::read(encrypt, doc_id, r, key_len, true)?;
                let key = authenticate_legacy(&params, password)?;
                Ok(Self {
                    key,
                    revision: r,
                    string_method: CryptMethod::Rc4,
                    stream_method: CryptMethod::Rc4,
                    encrypt_metadata: true,
                })
            }
            (4, 4) => {
                let encrypt_metadata = get_bool_or(encrypt, b"EncryptMetadata", true);
                let params = EncryptParams::read(encrypt, doc_id, r, 16, encrypt_metadata)?;
                let string_method = crypt_filter_method(encrypt, b"StrF", false)?;
                let stream_method = crypt_filter_method(encrypt, b"StmF", false)?;
                let key = authenticate_legacy(&params, password)?;
                Ok(Self {
                    key,
                    revision: r,
                    string_method,
                    stream_method,
                    encrypt_metadata,
                })
            }
            (5, 5 | 6) => {
                let encrypt_metadata = get_bool_or(encrypt, b"EncryptMetadata", true);
                let string_method = crypt_filter_method(encrypt, b"StrF", true)?;
                let stream_method = crypt_filter_method(encrypt, b"StmF", true)?;
                let key = authenticate_aes256(encrypt, r, password)?;
                Ok(Self {
                    key,
                    revision: r,
                    string_method,
                    stream_method,
                    encrypt_metadata,
                })
            }
            _ => Err(unsupported(format!(
                "unsupported encryption V={} R={}",
                v, r
            ))),
        }
    }

    pub fn revision(&self) -> i64 {
        self.revision
    }

    pub fn decrypt_string(&self, id: ObjectId, data: &[u8]) -> Result<Vec<u8>, DecryptError> {
        self.apply(self.string_method, id, data)
    }

    /// Decrypt a stream body. `dict` is the stream dictionary, used to leave
    /// metadata streams alone when `/EncryptMetadata` is false.
    pub fn decrypt_stream(
        &self,
        id: ObjectId,
        dict: &Dictionary,
        data: &[u8],
    ) -> Result<Vec<u8>, DecryptError> {
        if !self.encrypt_metadata && has_type(dict, b"Metadata") {
            return Ok(data.to_vec());
        }
        self.apply(self.stream_method, id, data)
    }

    fn apply(
        &self,
        method: CryptMethod,
        id: ObjectId,
        data: &[u8],
    ) -> Result<Vec<u8>, DecryptError> {
        match method {
            CryptMethod::Identity => Ok(data.to_vec()),
            CryptMethod::Rc4 => Ok(rc4(&self.object_key(id, false), data)),
            CryptMethod::Aes128 => aes_payload(&self.object_key(id, true), data),
            CryptMethod::Aes256 => aes_payload(&self.key, data),
        }
    }

    /// Per-object key: MD5(key ‖ objnum[3] ‖ gen[2] [‖ "sAlT"]).
    fn object_key(&self, (num, generation): ObjectId, aes: bool) -> Vec<u8> {
        let mut context = md5::Context::new();
        context.consume(&self.key);
        context.consume(&num.to_le_bytes()[..3]);
        context.consume(generation.to_le_bytes());
        if aes {
            context.consume(b"sAlT");
        }
        let digest = context.finalize();
        let len = (self.key.len() + 5).min(16);
        digest.0[..len].to_vec()
    }
}

impl EncryptParams {
    fn read(
        encrypt: &Dictionary,
        doc_id: &[u8],
        revision: i64,
        key_len: usize,
        encrypt_metadata: bool,
    ) -> Result<Self, DecryptError> {
        Ok(Self {
            revision,
            key_len,
            o: get_bytes(encrypt, b"O")?,
            u: get_bytes(encrypt, b"U")?,
            // P is signed in the file; the key derivation wants its raw bits
            p: get_int(encrypt, b"P")? as u32,
            doc_id: doc_id.to_vec(),
            encrypt_metadata,
        })
    }
}

fn legacy_key_length(bits: i64) -> Result<usize, DecryptError> {
    if !(40..=128).contains(&bits) || bits % 8 != 0 {
        return Err(unsupported(format!("invalid RC4 key length {}", bits)));
    }
    Ok(bits as usize / 8)
}

/// Pad or truncate a password to 32 bytes.
pub fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut padded = [0u8; 32];
    let len = password.len().min(32);
    padded[..len].copy_from_slice(&password[..len]);
    padded[len..].copy_from_slice(&PASSWORD_PADDING[..32 - len]);
    padded
}

fn authenticate_legacy(params: &EncryptParams, password: &str) -> Result<Vec<u8>, DecryptError> {
    for candidate in legacy_password_candidates(password) {
        if let Some(key) = check_user_password(params, &candidate) {
            return Ok(key);
        }
        if let Some(key) = check_owner_password(params, &candidate) {
            return Ok(key);
        }
    }
    Err(DecryptError::WrongPassword)
}

/// Byte encodings to try for an R2-R4 password: Latin-1 when every
/// character fits in one byte (what PDFDocEncoding writers produce for
/// accented Latin text), then UTF-8.
pub fn legacy_password_candidates(password: &str) -> Vec<Cow<'_, [u8]>> {
    if password.is_ascii() {
        return vec![Cow::Borrowed(password.as_bytes())];
    }

    let mut candidates = Vec::with_capacity(2);
    let latin1: Option<Vec<u8>> = password
        .chars()
        .map(|c| u8::try_from(u32::from(c)).ok())
        .collect();
    if let Some(latin1) = latin1 {
        candidates.push(Cow::Owned(latin1));
    }
    candidates.push(Cow::Borrowed(password.as_bytes()));
    candidates
}

/// UTF-8 bytes of an R5/R6 password, truncated to 127 bytes. R6 runs the
/// password through SASLprep first and falls back to the raw string when
/// it contains prohibited characters.
fn aes256_password(password: &str, revision: i64) -> Vec<u8> {
    let prepared = if revision >= 6 && !password.is_empty() {
        stringprep::saslprep(password).unwrap_or(Cow::Borrowed(password))
    } else {
        Cow::Borrowed(password)
    };
    let bytes = prepared.as_bytes();
    bytes[..bytes.len().min(127)].to_vec()
}

/// File key from a user password (R2-R4).
fn legacy_file_key(params: &EncryptParams, password: &[u8]) -> Vec<u8> {
    let mut context = md5::Context::new();
    context.consume(pad_password(password));
    context.consume(&params.o);
    context.consume(params.p.to_le_bytes());
    context.consume(&params.doc_id);
    if params.revision >= 4 && !params.encrypt_metadata {
        context.consume([0xFF, 0xFF, 0xFF, 0xFF]);
    }

    let mut hash = context.finalize().0.to_vec();
    let n = params.key_len;
    if params.revision >= 3 {
        for _ in 0..50 {
            hash = md5::compute(&hash[..n]).0.to_vec();
        }
    }
    hash.truncate(n);
    hash
}

fn check_user_password(params: &EncryptParams, password: &[u8]) -> Option<Vec<u8>> {
    let key = legacy_file_key(params, password);

    if params.revision == 2 {
        let computed = rc4(&key, &PASSWORD_PADDING);
        return (params.u.len() >= 32 && computed[..] == params.u[..32]).then_some(key);
    }

    let mut context = md5::Context::new();
    context.consume(PASSWORD_PADDING);
    context.consume(&params.doc_id);
    let mut computed = rc4(&key, &context.finalize().0);
    for i in 1..20u8 {
        let round_key: Vec<u8> = key.iter().map(|b| b ^ i).collect();
        computed = rc4(&round_key, &computed);
    }

    (params.u.len() >= 16 && computed[..16] == params.u[..16]).then_some(key)
}

/// Recover the user password from `/O` with the owner password, then run
/// the user check with it.
fn check_owner_password(params: &EncryptParams, password: &[u8]) -> Option<Vec<u8>> {
    let mut hash = md5::compute(pad_password(password)).0.to_vec();
    if params.revision >= 3 {
        for _ in 0..50 {
            hash = md5::compute(&hash).0.to_vec();
        }
    }
    let owner_key = &hash[..params.key_len];

    let user_password = if params.revision == 2 {
        rc4(owner_key, &params.o)
    } else {
        let mut result = params.o.clone();
        for i in (0..20u8).rev() {
            let round_key: Vec<u8> = owner_key.iter().map(|b| b ^ i).collect();
            result = rc4(&round_key, &result);
        }
        result
    };

    check_user_password(params, &user_password)
}

fn authenticate_aes256(
    encrypt: &Dictionary,
    revision: i64,
    password: &str,
) -> Result<Vec<u8>, DecryptError> {
    let o = get_bytes(encrypt, b"O")?;
    let u = get_bytes(encrypt, b"U")?;
    let oe = get_bytes(encrypt, b"OE")?;
    let ue = get_bytes(encrypt, b"UE")?;

    if o.len() < 48 || u.len() < 48 {
        return Err(unsupported("/O and /U must be at least 48 bytes"));
    }
    if oe.len() < 32 || ue.len() < 32 {
        return Err(unsupported("/OE and /UE must be at least 32 bytes"));
    }

    let password = aes256_password(password, revision);
    let u_vector = &u[..48];
    let hash = |salt: &[u8], vector: Option<&[u8]>| {
        if revision == 5 {
            Ok(revision5_hash(&password, salt, vector))
        } else {
            revision6_hash(&password, salt, vector)
        }
    };

    if hash(&o[32..40], Some(u_vector))? == o[..32] {
        let intermediate = hash(&o[40..48], Some(u_vector))?;
        return aes_cbc_decrypt(&intermediate, &[0u8; 16], &oe[..32]);
    }

    if hash(&u[32..40], None)? == u[..32] {
        let intermediate = hash(&u[40..48], None)?;
        return aes_cbc_decrypt(&intermediate, &[0u8; 16], &ue[..32]);
    }

    Err(DecryptError::WrongPassword)
}

/// Single SHA-256 password hash used by revision 5.
pub fn revision5_hash(password: &[u8], salt: &[u8], vector: Option<&[u8]>) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(password);
    hasher.update(salt);
    if let Some(v) = vector {
        hasher.update(v);
    }
    hasher.finalize().to_vec()
}

/// Iterated SHA-2/AES password hash used by revision 6.
pub fn revision6_hash(
    password: &[u8],
    salt: &[u8],
    vector: Option<&[u8]>,
) -> Result<Vec<u8>, DecryptError> {
    let vector = vector.unwrap_or(&[]);
    let mut k = revision5_hash(password, salt, Some(vector));

    let mut round: u32 = 0;
    let mut last_byte: u8 = 0;
    while round < 64 || u32::from(last_byte) > round - 32 {
        let mut block = Vec::with_capacity(password.len() + k.len() + vector.len());
        block.extend_from_slice(password);
        block.extend_from_slice(&k);
        block.extend_from_slice(vector);
        let k1 = block.repeat(64);

        let e = aes_cbc_encrypt(&k[..16], &k[16..32], &k1)?;

        // 256 ≡ 1 (mod 3), so the 128-bit number mod 3 is the byte sum mod 3
        let selector = e[..16].iter().map(|&b| u32::from(b)).sum::<u32>() % 3;
        k = match selector {
            0 => Sha256::digest(&e).to_vec(),
            1 => Sha384::digest(&e).to_vec(),
            _ => Sha512::digest(&e).to_vec(),
        };

        last_byte = e[e.len() - 1];
        round += 1;
    }

    k.truncate(32);
    Ok(k)
}

/// AES payload layout: 16-byte IV followed by PKCS#7-padded ciphertext.
fn aes_payload(key: &[u8], data: &[u8]) -> Result<Vec<u8>, DecryptError> {
    if data.len() < AES_BLOCK {
        return Ok(data.to_vec());
    }
    let (iv, body) = data.split_at(AES_BLOCK);
    if body.is_empty() {
        return Ok(Vec::new());
    }
    let plain = aes_cbc_decrypt(key, iv, body)?;
    Ok(unpad_pkcs7(&plain).to_vec())
}

/// Resolve `/StrF` or `/StmF` through `/CF` to a cipher.
fn crypt_filter_method(
    encrypt: &Dictionary,
    key: &[u8],
    aes256: bool,
) -> Result<CryptMethod, DecryptError> {
    let name = match encrypt.get(key).and_then(Object::as_name) {
        Ok(name) => name,
        Err(_) => return Ok(CryptMethod::Identity),
    };
    if name == b"Identity" {
        return Ok(CryptMethod::Identity);
    }

    let filter = encrypt
        .get(b"CF")
        .and_then(Object::as_dict)
        .and_then(|cf| cf.get(name))
        .and_then(Object::as_dict)
        .map_err(|_| {
            unsupported(format!(
                "crypt filter /{} not found in /CF",
                String::from_utf8_lossy(name)
            ))
        })?;

    let cfm = filter
        .get(b"CFM")
        .and_then(Object::as_name)
        .unwrap_or(b"None".as_slice());

    match (cfm, aes256) {
        (b"None", _) => Ok(CryptMethod::Identity),
        (b"V2", false) => Ok(CryptMethod::Rc4),
        (b"AESV2", false) => Ok(CryptMethod::Aes128),
        (b"AESV3", true) => Ok(CryptMethod::Aes256),
        (other, _) => Err(unsupported(format!(
            "unsupported crypt filter method /{}",
            String::from_utf8_lossy(other)
        ))),
    }
}

fn has_type(dict: &Dictionary, type_name: &[u8]) -> bool {
    dict.get(b"Type")
        .and_then(Object::as_name)
        .map(|name| name == type_name)
        .unwrap_or(false)
}

fn get_int(dict: &Dictionary, key: &[u8]) -> Result<i64, DecryptError> {
    dict.get(key)
        .and_then(Object::as_i64)
        .map_err(|_| unsupported(format!("missing /{} in /Encrypt", String::from_utf8_lossy(key))))
}

fn get_int_or(dict: &Dictionary, key: &[u8], default: i64) -> i64 {
    dict.get(key).and_then(Object::as_i64).unwrap_or(default)
}

fn get_bool_or(dict: &Dictionary, key: &[u8], default: bool) -> bool {
    dict.get(key).and_then(Object::as_bool).unwrap_or(default)
}

fn get_bytes(dict: &Dictionary, key: &[u8]) -> Result<Vec<u8>, DecryptError> {
    dict.get(key)
        .and_then(Object::as_str)
        .map(<[u8]>::to_vec)
        .map_err(|_| unsupported(format!("missing /{} in /Encrypt", String::from_utf8_lossy(key))))
}

fn unsupported(msg: impl Into<String>) -> DecryptError {
    DecryptError::MalformedOrUnsupported(msg.into())
}
