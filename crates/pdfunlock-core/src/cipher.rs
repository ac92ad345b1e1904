//! Block and stream ciphers used by the standard security handler.
//!
//! RC4 is small enough to carry here; AES-CBC goes through the `aes` and
//! `cbc` crates with padding handled by the caller.

use aes::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use crate::error::DecryptError;

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;

pub const AES_BLOCK: usize = 16;

/// RC4 stream cipher.
pub struct Arcfour {
    state: [u8; 256],
    i: u8,
    j: u8,
}

impl Arcfour {
    /// Key-scheduling. `key` must be non-empty.
    pub fn new(key: &[u8]) -> Self {
        let mut state: [u8; 256] = std::array::from_fn(|i| i as u8);

        let mut j: u8 = 0;
        for i in 0..256 {
            j = j
                .wrapping_add(state[i])
                .wrapping_add(key[i % key.len()]);
            state.swap(i, j as usize);
        }

        Self { state, i: 0, j: 0 }
    }

    /// Encrypt or decrypt (RC4 is symmetric).
    pub fn process(&mut self, data: &[u8]) -> Vec<u8> {
        data.iter().map(|byte| byte ^ self.next_byte()).collect()
    }

    fn next_byte(&mut self) -> u8 {
        self.i = self.i.wrapping_add(1);
        self.j = self.j.wrapping_add(self.state[self.i as usize]);
        self.state.swap(self.i as usize, self.j as usize);

        let idx = self.state[self.i as usize].wrapping_add(self.state[self.j as usize]);
        self.state[idx as usize]
    }
}

/// One-shot RC4 over `data`.
pub fn rc4(key: &[u8], data: &[u8]) -> Vec<u8> {
    Arcfour::new(key).process(data)
}

/// AES-CBC decryption without padding removal. Key must be 16 or 32 bytes.
pub fn aes_cbc_decrypt(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>, DecryptError> {
    if data.len() % AES_BLOCK != 0 {
        return Err(DecryptError::MalformedOrUnsupported(format!(
            "AES ciphertext length {} is not a multiple of {}",
            data.len(),
            AES_BLOCK
        )));
    }

    let mut buf = data.to_vec();
    match key.len() {
        16 => {
            Aes128CbcDec::new_from_slices(key, iv)
                .map_err(|e| aes_error("AES-128 init", e))?
                .decrypt_padded_mut::<NoPadding>(&mut buf)
                .map_err(|e| aes_error("AES-128 decrypt", e))?;
        }
        32 => {
            Aes256CbcDec::new_from_slices(key, iv)
                .map_err(|e| aes_error("AES-256 init", e))?
                .decrypt_padded_mut::<NoPadding>(&mut buf)
                .map_err(|e| aes_error("AES-256 decrypt", e))?;
        }
        n => {
            return Err(DecryptError::MalformedOrUnsupported(format!(
                "AES key must be 16 or 32 bytes, got {}",
                n
            )))
        }
    }
    Ok(buf)
}

/// AES-CBC encryption of block-aligned data. Key must be 16 or 32 bytes.
pub fn aes_cbc_encrypt(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>, DecryptError> {
    if data.len() % AES_BLOCK != 0 {
        return Err(DecryptError::MalformedOrUnsupported(format!(
            "AES plaintext length {} is not a multiple of {}",
            data.len(),
            AES_BLOCK
        )));
    }

    let mut buf = data.to_vec();
    let len = buf.len();
    match key.len() {
        16 => {
            Aes128CbcEnc::new_from_slices(key, iv)
                .map_err(|e| aes_error("AES-128 init", e))?
                .encrypt_padded_mut::<NoPadding>(&mut buf, len)
                .map_err(|e| aes_error("AES-128 encrypt", e))?;
        }
        32 => {
            Aes256CbcEnc::new_from_slices(key, iv)
                .map_err(|e| aes_error("AES-256 init", e))?
                .encrypt_padded_mut::<NoPadding>(&mut buf, len)
                .map_err(|e| aes_error("AES-256 encrypt", e))?;
        }
        n => {
            return Err(DecryptError::MalformedOrUnsupported(format!(
                "AES key must be 16 or 32 bytes, got {}",
                n
            )))
        }
    }
    Ok(buf)
}

/// Strip PKCS#7 padding, leaving the data untouched if the padding is not
/// well formed. Some writers pad incorrectly and readers accept it.
pub fn unpad_pkcs7(data: &[u8]) -> &[u8] {
    let Some(&last) = data.last() else {
        return data;
    };

    let pad_len = last as usize;
    if pad_len == 0 || pad_len > AES_BLOCK || pad_len > data.len() {
        return data;
    }

    let start = data.len() - pad_len;
    if data[start..].iter().all(|&b| b as usize == pad_len) {
        &data[..start]
    } else {
        data
    }
}

/// Append PKCS#7 padding up to the next block boundary.
pub fn pad_pkcs7(data: &[u8]) -> Vec<u8> {
    let pad_len = AES_BLOCK - data.len() % AES_BLOCK;
    let mut out = Vec::with_capacity(data.len() + pad_len);
    out.extend_from_slice(data);
    out.resize(data.len() + pad_len, pad_len as u8);
    out
}

fn aes_error(stage: &str, err: impl std::fmt::Display) -> DecryptError {
    DecryptError::MalformedOrUnsupported(format!("{}: {}", stage, err))
}
