use std::io::{Read, Write};

use dcrypt_core::crypto::public_key::{PrivateKey, FINGERPRINT_LEN};
use dcrypt_core::io_ext::CountingReader;
use tracing::debug;

use crate::container::{Container, ContainerV1, ContainerV2, FormatError, Warning};
use crate::payload::{decrypt_v1, decrypt_v2, PayloadOutcome};
use crate::reader::read_container;
use crate::recipient::{find_recipient, implicit_v1_recipient, provided_fingerprint, RecipientMatch};
use crate::unwrap::{unwrap_v1, unwrap_v2, SaltSource, UnwrapResult};

/// Policy switches for a decode. The default salts from the first
/// recipient and only warns on a v2 key digest mismatch.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecodeOptions {
    pub salt_source: SaltSource,
    /// Treat a v2 content-key digest mismatch as fatal.
    pub strict_key_digest: bool,
    /// Report an HMAC mismatch as a warning and still emit plaintext.
    pub warn_on_integrity_failure: bool,
}

pub struct DecodeRequest<'a> {
    pub private_key: Option<&'a PrivateKey>,
    pub want_info: bool,
    pub input: &'a mut dyn Read,
    pub output: &'a mut dyn Write,
    pub options: DecodeOptions,
}

#[derive(Debug)]
pub struct DecodeResult {
    pub container: Container,
    pub provided_fingerprint: Option<[u8; FINGERPRINT_LEN]>,
    pub recipient_index: Option<usize>,
    pub recipient_verified: bool,
    pub unwrap: Option<UnwrapResult>,
    pub bytes_written: u64,
    /// Tag or HMAC taken from the end of the payload.
    pub trailer: Vec<u8>,
    pub warnings: Vec<Warning>,
    /// Failure after the header parsed; the container above is still valid.
    pub decrypt_error: Option<FormatError>,
}

impl DecodeResult {
    fn new(container: Container) -> Self {
        let warnings = container.header_warnings();
        Self {
            container,
            provided_fingerprint: None,
            recipient_index: None,
            recipient_verified: false,
            unwrap: None,
            bytes_written: 0,
            trailer: Vec::new(),
            warnings,
            decrypt_error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.decrypt_error.is_none()
    }
}

/// Version-specific match, unwrap and payload behaviour.
pub trait ContainerScheme {
    fn match_recipient(&self, key: &PrivateKey) -> Result<RecipientMatch, FormatError>;

    fn unwrap_content_key(
        &self,
        recipient: &RecipientMatch,
        key: &PrivateKey,
        options: &DecodeOptions,
        warnings: &mut Vec<Warning>,
    ) -> Result<UnwrapResult, FormatError>;

    fn decrypt_payload(
        &self,
        content_key: &[u8],
        input: &mut dyn Read,
        output: &mut dyn Write,
        options: &DecodeOptions,
        warnings: &mut Vec<Warning>,
    ) -> Result<PayloadOutcome, FormatError>;
}

impl ContainerScheme for ContainerV1 {
    fn match_recipient(&self, _key: &PrivateKey) -> Result<RecipientMatch, FormatError> {
        Ok(implicit_v1_recipient())
    }

    fn unwrap_content_key(
        &self,
        _recipient: &RecipientMatch,
        key: &PrivateKey,
        _options: &DecodeOptions,
        _warnings: &mut Vec<Warning>,
    ) -> Result<UnwrapResult, FormatError> {
        unwrap_v1(self, key)
    }

    fn decrypt_payload(
        &self,
        content_key: &[u8],
        input: &mut dyn Read,
        output: &mut dyn Write,
        _options: &DecodeOptions,
        _warnings: &mut Vec<Warning>,
    ) -> Result<PayloadOutcome, FormatError> {
        decrypt_v1(content_key, input, output)
    }
}

impl ContainerScheme for ContainerV2 {
    fn match_recipient(&self, key: &PrivateKey) -> Result<RecipientMatch, FormatError> {
        find_recipient(self, &provided_fingerprint(key)?)
    }

    fn unwrap_content_key(
        &self,
        recipient: &RecipientMatch,
        key: &PrivateKey,
        options: &DecodeOptions,
        warnings: &mut Vec<Warning>,
    ) -> Result<UnwrapResult, FormatError> {
        unwrap_v2(
            self,
            recipient.index,
            key,
            options.salt_source,
            options.strict_key_digest,
            warnings,
        )
    }

    fn decrypt_payload(
        &self,
        content_key: &[u8],
        input: &mut dyn Read,
        output: &mut dyn Write,
        options: &DecodeOptions,
        warnings: &mut Vec<Warning>,
    ) -> Result<PayloadOutcome, FormatError> {
        decrypt_v2(
            self,
            content_key,
            input,
            output,
            options.warn_on_integrity_failure,
            warnings,
        )
    }
}

impl Container {
    pub fn scheme(&self) -> &dyn ContainerScheme {
        match self {
            Container::V1(c) => c,
            Container::V2(c) => c,
        }
    }
}

/// Parses the header and, when a key is supplied, decrypts the payload.
///
/// Header failures are returned as `Err`. Failures after the header parsed
/// land in [`DecodeResult::decrypt_error`] so diagnostics stay available.
/// A request with neither a key nor `want_info` is rejected before any
/// input is read.
pub fn decode(request: DecodeRequest<'_>) -> Result<DecodeResult, FormatError> {
    let DecodeRequest {
        private_key,
        want_info,
        input,
        output,
        options,
    } = request;
    if private_key.is_none() && !want_info {
        return Err(FormatError::MissingPrivateKey);
    }

    let mut reader = CountingReader::new(input);
    let container = read_container(&mut reader)?;
    let mut result = DecodeResult::new(container);

    let Some(key) = private_key else {
        debug!(want_info, "no private key, header parsed only");
        return Ok(result);
    };
    let outcome = provided_fingerprint(key).and_then(|fingerprint| {
        result.provided_fingerprint = Some(fingerprint);
        run_decrypt(&mut result, key, &mut reader, output, &options)
    });
    if let Err(err) = outcome {
        debug!(error = %err, "decryption failed");
        result.decrypt_error = Some(err);
    }
    Ok(result)
}

fn run_decrypt(
    result: &mut DecodeResult,
    key: &PrivateKey,
    input: &mut dyn Read,
    output: &mut dyn Write,
    options: &DecodeOptions,
) -> Result<(), FormatError> {
    let scheme = result.container.scheme();

    let recipient = scheme.match_recipient(key)?;
    result.recipient_index = Some(recipient.index);
    result.recipient_verified = recipient.verified;
    debug!(
        index = recipient.index,
        verified = recipient.verified,
        "matched recipient"
    );

    let unwrap = scheme.unwrap_content_key(&recipient, key, options, &mut result.warnings)?;
    let unwrap = result.unwrap.insert(unwrap);

    let outcome = scheme.decrypt_payload(
        &unwrap.content_key,
        input,
        output,
        options,
        &mut result.warnings,
    )?;
    result.bytes_written = outcome.bytes_written;
    result.trailer = outcome.trailer;
    Ok(())
}

/// Decrypts `input` into `output`, turning any decrypt-phase failure into
/// an error.
pub fn decrypt(
    input: &mut dyn Read,
    output: &mut dyn Write,
    key: &PrivateKey,
    options: DecodeOptions,
) -> Result<DecodeResult, FormatError> {
    let mut result = decode(DecodeRequest {
        private_key: Some(key),
        want_info: false,
        input,
        output,
        options,
    })?;
    match result.decrypt_error.take() {
        Some(err) => Err(err),
        None => Ok(result),
    }
}
