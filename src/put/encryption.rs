use aes::cipher::block_padding::Pkcs7;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockCipher, BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit};
use aes::{Aes128, Aes192, Aes256};
use base64::{Engine, engine::general_purpose::STANDARD};
use rsa::rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const BLOCK_SIZE: usize = 16;

/// Per-query stage key handed out by Snowflake for client-side encryption.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionMaterial {
    pub query_stage_master_key: String,
    pub query_id: String,
    pub smk_id: i64,
}

/// What the stage needs to decrypt an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EncryptionMetadata {
    /// File key wrapped with the master key, base64.
    pub(crate) key: String,
    /// CBC initialisation vector, base64.
    pub(crate) iv: String,
    /// Material descriptor JSON.
    pub(crate) matdesc: String,
}

#[derive(Serialize)]
struct MaterialDescriptor<'a> {
    #[serde(rename = "queryId")]
    query_id: &'a str,
    #[serde(rename = "smkId")]
    smk_id: String,
    #[serde(rename = "keySize")]
    key_size: String,
}

/// Encrypts `data` with a fresh file key and IV.
pub(crate) fn encrypt(
    material: &EncryptionMaterial,
    data: &[u8],
) -> Result<(Vec<u8>, EncryptionMetadata)> {
    let master_key = STANDARD.decode(&material.query_stage_master_key)?;

    let mut file_key = vec![0u8; master_key.len()];
    OsRng.fill_bytes(&mut file_key);
    let mut iv = [0u8; BLOCK_SIZE];
    OsRng.fill_bytes(&mut iv);

    let encrypted = cbc_encrypt(&file_key, &iv, data)?;
    let wrapped_key = wrap_key(&master_key, &file_key)?;

    let matdesc = serde_json::to_string(&MaterialDescriptor {
        query_id: &material.query_id,
        smk_id: material.smk_id.to_string(),
        key_size: (master_key.len() * 8).to_string(),
    })
    .map_err(|e| Error::Encryption(format!("failed to encode material descriptor: {e}")))?;

    Ok((
        encrypted,
        EncryptionMetadata {
            key: STANDARD.encode(wrapped_key),
            iv: STANDARD.encode(iv),
            matdesc,
        },
    ))
}

/// AES-CBC with PKCS#7 padding; the key length picks AES-128/192/256.
fn cbc_encrypt(key: &[u8], iv: &[u8; BLOCK_SIZE], data: &[u8]) -> Result<Vec<u8>> {
    match key.len() {
        16 => cbc_encrypt_with::<Aes128>(key, iv, data),
        24 => cbc_encrypt_with::<Aes192>(key, iv, data),
        32 => cbc_encrypt_with::<Aes256>(key, iv, data),
        n => Err(invalid_key_length(n)),
    }
}

fn cbc_encrypt_with<C>(key: &[u8], iv: &[u8; BLOCK_SIZE], data: &[u8]) -> Result<Vec<u8>>
where
    C: BlockEncryptMut + BlockCipher + KeyInit,
{
    let encryptor = cbc::Encryptor::<C>::new_from_slices(key, iv)
        .map_err(|_| invalid_key_length(key.len()))?;
    Ok(encryptor.encrypt_padded_vec_mut::<Pkcs7>(data))
}

/// Pads the file key to whole blocks and encrypts it with the master key in
/// ECB mode.
fn wrap_key(master_key: &[u8], file_key: &[u8]) -> Result<Vec<u8>> {
    let padding = BLOCK_SIZE - file_key.len() % BLOCK_SIZE;
    let mut buf = Vec::with_capacity(file_key.len() + padding);
    buf.extend_from_slice(file_key);
    buf.resize(file_key.len() + padding, padding as u8);

    match master_key.len() {
        16 => ecb_encrypt_with::<Aes128>(master_key, &mut buf)?,
        24 => ecb_encrypt_with::<Aes192>(master_key, &mut buf)?,
        32 => ecb_encrypt_with::<Aes256>(master_key, &mut buf)?,
        n => return Err(invalid_key_length(n)),
    }
    Ok(buf)
}

fn ecb_encrypt_with<C: BlockEncrypt + KeyInit>(key: &[u8], buf: &mut [u8]) -> Result<()> {
    let cipher = C::new_from_slice(key).map_err(|_| invalid_key_length(key.len()))?;
    for block in buf.chunks_exact_mut(BLOCK_SIZE) {
        cipher.encrypt_block(GenericArray::from_mut_slice(block));
    }
    Ok(())
}

fn invalid_key_length(len: usize) -> Error {
    Error::Encryption(format!("unsupported key length: {len} bytes"))
}
