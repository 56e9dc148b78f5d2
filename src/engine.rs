//! `StorageCore`: the public API, the unlock state machine, and the fault
//! handler.

use zeroize::Zeroize;

use crate::auth::{auth_get, auth_init, auth_set, auth_update, AuthState};
use crate::config::StorageConfig;
use crate::constants::{
    CHACHA20_IV_SIZE, EXTERNAL_SALT_SIZE, FALSE_BYTE, FALSE_WORD, KEYS_SIZE,
    MAX_ENCRYPTED_VALUE_LEN, MAX_WIPE_CODE_LEN, PIN_MAX_TRIES, POLY1305_TAG_SIZE, PVC_SIZE,
    STORAGE_SALT_SIZE, STORAGE_VERSION, TRUE_BYTE, WIPE_CODE_EMPTY, WIPE_CODE_SALT_SIZE,
    WIPE_CODE_TAG_SIZE,
};
use crate::crypto::aead;
use crate::crypto::{hmac_sha256, random_buffer, secequal, secequal32, wait_random};
use crate::error::StorageError;
use crate::keys::{EDEK_PVC, PIN_NOT_SET, STORAGE_UPGRADED, UNAUTH_VERSION, VERSION, WIPE_CODE_DATA};
use crate::log::{is_protected, is_public, is_write_locked, make_key, RecordLog};
use crate::pin_fail::PinFailLog;
use crate::progress::{Delay, FaultScreens, ProgressCallback};
use crate::secbool::SecBool;
use crate::session::{derive_kek_keiv_software, Session};
use crate::upgrade::{check_storage_version, int_to_wipe_code, pin_to_int, v0_pin_get_fails};

#[cfg(feature = "secure-element")]
use crate::crypto::pin_stretch::PinStretch;
#[cfg(feature = "secure-element")]
use crate::session::derive_kek_keiv_secure_element;

const V0_PIN_KEY: u16 = make_key(crate::log::APP_STORAGE, 0x00);

/// The storage engine's public API, generic over its record log and
/// PIN-fail counter collaborators.
pub struct StorageCore<L: RecordLog, P: PinFailLog> {
    log: L,
    pin_fails: P,
    session: Session,
    config: StorageConfig,
    /// Version the on-flash log reported at `init`, before any upgrade ran.
    lock_version: u32,
    #[cfg(feature = "secure-element")]
    stretch: Box<dyn PinStretch>,
}

impl<L: RecordLog, P: PinFailLog> StorageCore<L, P> {
    #[cfg(not(feature = "secure-element"))]
    pub fn new(log: L, pin_fails: P, config: StorageConfig) -> Self {
        Self {
            log,
            pin_fails,
            session: Session::new(),
            config,
            lock_version: STORAGE_VERSION,
        }
    }

    #[cfg(feature = "secure-element")]
    pub fn new(log: L, pin_fails: P, stretch: Box<dyn PinStretch>, config: StorageConfig) -> Self {
        Self {
            log,
            pin_fails,
            session: Session::new(),
            config,
            lock_version: STORAGE_VERSION,
            stretch,
        }
    }

    fn derive(
        &mut self,
        pin: &[u8],
        salt: &[u8],
        is_set: bool,
        progress: &mut dyn ProgressCallback,
    ) -> Result<([u8; 32], [u8; 32]), StorageError> {
        #[cfg(feature = "secure-element")]
        {
            derive_kek_keiv_secure_element(pin, salt, self.stretch.as_mut(), is_set, progress)
                .map_err(StorageError::from)
        }
        #[cfg(not(feature = "secure-element"))]
        {
            let _ = is_set;
            derive_kek_keiv_software(pin, salt, progress).map_err(StorageError::from)
        }
    }

    fn combined_salt(&self, storage_salt: &[u8], ext_salt: Option<&[u8]>) -> Vec<u8> {
        let mut salt = Vec::with_capacity(self.session.hardware_salt.len() + STORAGE_SALT_SIZE + EXTERNAL_SALT_SIZE);
        salt.extend_from_slice(&self.session.hardware_salt);
        salt.extend_from_slice(storage_salt);
        if let Some(ext) = ext_salt {
            salt.extend_from_slice(ext);
        }
        salt
    }

    /// Reject an appid the host never registered, masking off the
    /// PUBLIC/WRITE flag bits before comparing against `config.max_appid`.
    fn app_allowed(&self, app: u8) -> bool {
        (app & 0x3f) <= self.config.max_appid
    }

    fn sak(&self) -> Result<Vec<u8>, StorageError> {
        self.session.sak().map(|s| s.to_vec()).ok_or(StorageError::NotInitialized)
    }

    fn dek(&self) -> Result<Vec<u8>, StorageError> {
        self.session.dek().map(|s| s.to_vec()).ok_or(StorageError::NotInitialized)
    }

    // ---- fault handling -------------------------------------------------

    /// Common exit path for any detected integrity anomaly: wipe, show the
    /// fatal-error screen, log, and return a fault. A second fault observed
    /// while already handling one (`reentrant`) skips straight to the wipe
    /// with no further bookkeeping.
    fn handle_fault(&mut self, msg: &'static str, faults: &mut dyn FaultScreens) -> StorageError {
        log::error!("fault detected: {msg}");
        let _ = self.wipe_internal();
        faults.fatal_error("Fault detected", msg);
        StorageError::Fault(msg)
    }

    /// Erase the log and immediately re-establish fresh, empty-PIN storage:
    /// the `Wiped` state is transient — every wipe call site expects
    /// to leave the engine `Locked` with a usable empty-PIN store, not with
    /// the reserved bookkeeping keys missing.
    fn wipe_internal(&mut self) -> Result<(), StorageError> {
        self.init_wiped_storage(&mut crate::progress::NullProgress)?;
        self.session.lock();
        Ok(())
    }

    // ---- pin / wipe-code primitives -------------------------------------

    fn set_pin(&mut self, pin: &[u8], ext_salt: Option<&[u8]>, progress: &mut dyn ProgressCallback) -> Result<(), StorageError> {
        let mut storage_salt = [0u8; STORAGE_SALT_SIZE];
        random_buffer(&mut storage_salt);
        let salt = self.combined_salt(&storage_salt, ext_salt);

        let (mut kek, mut keiv) = self.derive(pin, &salt, true, progress)?;
        let mut plaintext = self.dek_sak_bytes()?;

        let tag = aead::seal(&kek, &keiv, &[], &mut plaintext)?;
        kek.zeroize();
        keiv.zeroize();

        let mut record = Vec::with_capacity(STORAGE_SALT_SIZE + KEYS_SIZE + PVC_SIZE);
        record.extend_from_slice(&storage_salt);
        record.extend_from_slice(&plaintext);
        record.extend_from_slice(&tag[..PVC_SIZE]);
        plaintext.zeroize();

        self.log.set(EDEK_PVC, &record)?;
        self.log.set(PIN_NOT_SET, &[if pin.is_empty() { TRUE_BYTE } else { FALSE_BYTE }])?;
        Ok(())
    }

    fn dek_sak_bytes(&self) -> Result<Vec<u8>, StorageError> {
        let mut out = self.dek()?;
        out.extend(self.sak()?);
        Ok(out)
    }

    /// Decrypt `EDEK_PVC` with the supplied KEK/KEIV, comparing the PVC in
    /// constant time. On success, caches `DEK ‖ SAK`.
    ///
    /// The PVC match/mismatch is the one bit an attacker most wants to
    /// glitch, so it crosses this boundary as a [`SecBool`] rather than a
    /// plain `bool`: flipping it from `SECFALSE` to `SECTRUE` (or to
    /// anything else `is_true()` would accept) takes far more than the
    /// single stuck or skipped instruction a `bool`'s single significant
    /// bit would need.
    fn decrypt_dek(&mut self, kek: &[u8], keiv: &[u8]) -> Result<SecBool, StorageError> {
        let record = self.log.get(EDEK_PVC)?.ok_or(StorageError::Fault("no EDEK"))?;
        if record.len() != STORAGE_SALT_SIZE + KEYS_SIZE + PVC_SIZE {
            return Err(StorageError::Fault("no EDEK"));
        }
        let mut ekeys = record[STORAGE_SALT_SIZE..STORAGE_SALT_SIZE + KEYS_SIZE].to_vec();
        let stored_pvc = &record[STORAGE_SALT_SIZE + KEYS_SIZE..];

        let mut ctx = aead::Rfc7539Context::new(kek, keiv)?;
        ctx.decrypt(&mut ekeys);
        let tag = ctx.finish();

        let stored_words = bytes_to_words32(stored_pvc);
        let computed_words = bytes_to_words32(&tag[..PVC_SIZE]);
        wait_random(200);
        let pvc_matches = SecBool::from(secequal32(&computed_words, &stored_words));

        if pvc_matches.is_true() {
            let mut dek_sak = [0u8; KEYS_SIZE];
            dek_sak.copy_from_slice(&ekeys);
            ekeys.zeroize();
            self.session.unlock_with(dek_sak, AuthState::zero());
            dek_sak.zeroize();
            Ok(SecBool::TRUE)
        } else {
            ekeys.zeroize();
            Ok(SecBool::FALSE)
        }
    }

    fn set_wipe_code(&mut self, wipe_code: &[u8]) -> Result<(), StorageError> {
        let wipe_code = if wipe_code.len() > MAX_WIPE_CODE_LEN {
            return Err(StorageError::NotPermitted("wipe code too long"));
        } else if wipe_code.is_empty() {
            WIPE_CODE_EMPTY
        } else {
            wipe_code
        };

        let mut salt = [0u8; WIPE_CODE_SALT_SIZE];
        random_buffer(&mut salt);
        let tag = hmac_sha256(&salt, wipe_code);

        let mut record = Vec::with_capacity(wipe_code.len() + WIPE_CODE_SALT_SIZE + WIPE_CODE_TAG_SIZE);
        record.extend_from_slice(wipe_code);
        record.extend_from_slice(&salt);
        record.extend_from_slice(&tag[..WIPE_CODE_TAG_SIZE]);
        self.log.set(WIPE_CODE_DATA, &record)?;
        Ok(())
    }

    /// `true` if `pin` does NOT match the stored wipe code.
    fn is_not_wipe_code(&mut self, pin: &[u8]) -> Result<bool, StorageError> {
        let record = self
            .log
            .get(WIPE_CODE_DATA)?
            .ok_or(StorageError::Fault("no wipe code"))?;
        if record.len() <= WIPE_CODE_SALT_SIZE + WIPE_CODE_TAG_SIZE {
            return Err(StorageError::Fault("no wipe code"));
        }
        let wipe_code_len = record.len() - WIPE_CODE_SALT_SIZE - WIPE_CODE_TAG_SIZE;
        let wipe_code = &record[..wipe_code_len];
        let salt = &record[wipe_code_len..wipe_code_len + WIPE_CODE_SALT_SIZE];
        let stored_tag = &record[wipe_code_len + WIPE_CODE_SALT_SIZE..];

        let computed = hmac_sha256(salt, wipe_code);
        if !secequal(&computed[..WIPE_CODE_TAG_SIZE], stored_tag) {
            return Err(StorageError::Fault("wipe code tag"));
        }

        wait_random(200);
        let candidate_tag1 = hmac_sha256(salt, pin);
        wait_random(200);
        let candidate_tag2 = hmac_sha256(salt, pin);
        if !secequal(&candidate_tag1, &candidate_tag2) {
            return Err(StorageError::Fault("wipe code fault"));
        }

        wait_random(200);
        Ok(!secequal(&candidate_tag1[..WIPE_CODE_TAG_SIZE], stored_tag))
    }

    // ---- lifecycle --------------------------------------------------

    /// Open the log, hash the hardware salt, run any pending format upgrade,
    /// and initialize freshly wiped storage if no `EDEK_PVC` is present.
    pub fn init(
        &mut self,
        caller_salt: &mut [u8],
        progress: &mut dyn ProgressCallback,
        faults: &mut dyn FaultScreens,
    ) -> Result<(), StorageError> {
        let log_version = self.log.init()?;
        self.session.bind_hardware_salt(caller_salt);
        self.lock_version = log_version;

        if log_version < STORAGE_VERSION {
            if let Err(e) = self.storage_upgrade(log_version, progress) {
                let _ = self.wipe_internal();
                return Err(e);
            }
        }

        if self.log.get(EDEK_PVC)?.is_none() {
            self.init_wiped_storage(progress)?;
            self.lock();
        }

        self.session.initialized = true;
        let _ = faults;
        Ok(())
    }

    fn init_wiped_storage(&mut self, progress: &mut dyn ProgressCallback) -> Result<(), StorageError> {
        self.log.wipe()?;
        self.pin_fails.init(0)?;

        let mut dek_sak = [0u8; KEYS_SIZE];
        random_buffer(&mut dek_sak);
        self.session.unlock_with(dek_sak, AuthState::zero());
        dek_sak.zeroize();

        let sak = self.sak()?;
        self.session.auth = auth_init(&mut self.log, &sak)?;

        let version_bytes = STORAGE_VERSION.to_le_bytes();
        self.set_encrypted(VERSION, &version_bytes)?;
        self.log.set(UNAUTH_VERSION, &version_bytes)?;
        self.log.set(STORAGE_UPGRADED, &FALSE_WORD.to_le_bytes())?;
        self.set_wipe_code(&[])?;
        self.set_pin(&[], None, progress)?;
        Ok(())
    }

    fn set_encrypted(&mut self, key: u16, plaintext: &[u8]) -> Result<(), StorageError> {
        let dek = self.dek()?;
        let mut iv = [0u8; CHACHA20_IV_SIZE];
        random_buffer(&mut iv);
        let mut buf = plaintext.to_vec();
        let tag = aead::seal(&dek, &iv, &key.to_le_bytes(), &mut buf)?;

        let mut record = Vec::with_capacity(iv.len() + buf.len() + tag.len());
        record.extend_from_slice(&iv);
        record.extend_from_slice(&buf);
        record.extend_from_slice(&tag);

        let sak = self.sak()?;
        auth_set(&mut self.log, &sak, &mut self.session.auth, key, &record)
    }

    fn get_encrypted(&self, key: u16) -> Result<Option<Vec<u8>>, StorageError> {
        let dek = self.dek()?;
        let sak = self.sak()?;
        let record = match auth_get(&self.log, &sak, key)? {
            Some(r) => r,
            None => return Ok(None),
        };
        if record.len() < CHACHA20_IV_SIZE + POLY1305_TAG_SIZE {
            return Err(StorageError::Fault("ciphertext length check"));
        }
        let ct_len = record.len() - CHACHA20_IV_SIZE - POLY1305_TAG_SIZE;
        let iv = &record[..CHACHA20_IV_SIZE];
        let mut buf = record[CHACHA20_IV_SIZE..CHACHA20_IV_SIZE + ct_len].to_vec();
        let tag = &record[CHACHA20_IV_SIZE + ct_len..];

        match aead::open(&dek, iv, &key.to_le_bytes(), &mut buf, tag) {
            Ok(()) => Ok(Some(buf)),
            Err(_) => {
                buf.zeroize();
                Err(StorageError::Fault("authentication tag check"))
            }
        }
    }

    /// Unlock the session with `pin`/`ext_salt`. `Ok(false)` means wrong
    /// credentials; `Err(StorageError::Fault(_))` means the store was wiped.
    pub fn unlock(
        &mut self,
        pin: &[u8],
        ext_salt: Option<&[u8; EXTERNAL_SALT_SIZE]>,
        progress: &mut dyn ProgressCallback,
        delay: &mut dyn Delay,
        faults: &mut dyn FaultScreens,
    ) -> Result<bool, StorageError> {
        if !self.session.initialized {
            return Err(StorageError::NotInitialized);
        }

        let legacy_pin_bytes;
        let unlock_pin: &[u8] = if self.read_lock_version() <= 2 {
            legacy_pin_bytes = pin_to_int(pin).to_le_bytes();
            &legacy_pin_bytes
        } else {
            pin
        };

        match self.is_not_wipe_code(unlock_pin) {
            Ok(true) => {}
            Ok(false) => {
                let _ = self.wipe_internal();
                faults.show_wipe_code_screen();
                return Err(StorageError::Fault("wipe code entered"));
            }
            Err(e) => return Err(self.propagate_fault(e, faults)),
        }

        let ctr = self.pin_fails.get_fails()?;
        wait_random(200);
        if ctr >= PIN_MAX_TRIES {
            let _ = self.wipe_internal();
            faults.show_pin_too_many_screen();
            return Err(StorageError::Fault("too many PIN attempts"));
        }

        // Ten 100 ms `hal_delay` ticks per second of backoff, the pump
        // interleaved between ticks rather than slept all at once so a
        // cancelling host notices within 100 ms instead of the full budget.
        let wait_seconds = (1u32 << ctr).saturating_sub(1);
        for _ in 0..(10 * wait_seconds) {
            delay.hal_delay(100);
            if progress.on_progress(wait_seconds, 0, "unlocking") {
                return Ok(false);
            }
        }

        let ctr_after = self.pin_fails.fails_increase()?;
        if ctr_after != ctr + 1 {
            return Err(self.handle_fault("PIN counter increment", faults));
        }

        let storage_salt = self.read_storage_salt()?;
        let salt = self.combined_salt(&storage_salt, ext_salt.map(|s| s.as_slice()));
        let (mut kek, mut keiv) = self.derive(unlock_pin, &salt, false, progress)?;
        let pvc_ok = self.decrypt_dek(&kek, &keiv)?;
        kek.zeroize();
        keiv.zeroize();

        if pvc_ok.is_false() {
            if ctr_after >= PIN_MAX_TRIES {
                let _ = self.wipe_internal();
                faults.show_pin_too_many_screen();
                return Err(StorageError::Fault("too many PIN attempts"));
            }
            log::warn!("unlock attempt {ctr_after} failed");
            return Ok(false);
        }

        if let Err(e) = self.storage_upgrade_unlocked(pin, ext_salt) {
            return Err(self.propagate_fault(e, faults));
        }

        let decrypted_version = self.decrypted_version()?;
        if let Err(e) = check_storage_version(&mut self.log, STORAGE_VERSION, decrypted_version) {
            self.session.lock();
            faults.fatal_error("Fault detected", "storage version check");
            return Err(e);
        }
        // `check_storage_version` only rewrote the unauthenticated copy (it
        // has no crypto access); once it has accepted the transition, bump
        // the authenticated one to match so the two stay in lockstep.
        if decrypted_version != STORAGE_VERSION {
            self.set_encrypted(VERSION, &STORAGE_VERSION.to_le_bytes())?;
        }

        self.pin_fails.fails_reset()?;
        Ok(true)
    }

    fn propagate_fault(&mut self, e: StorageError, faults: &mut dyn FaultScreens) -> StorageError {
        if let StorageError::Fault(msg) = e {
            self.handle_fault(msg, faults)
        } else {
            e
        }
    }

    /// The logical format version in force for the *next* unlock's PIN
    /// encoding. Read fresh from `UNAUTH_VERSION` rather than the version
    /// cached at `init`: the first post-upgrade unlock rewrites `EDEK_PVC`
    /// under the new encoding and bumps `UNAUTH_VERSION` to match, and any
    /// later unlock in the same session must stop legacy-encoding the PIN
    /// once that has happened. Falls back to the boot-time log version if
    /// `UNAUTH_VERSION` isn't there yet (shouldn't happen past `init`).
    fn read_lock_version(&self) -> u32 {
        match self.log.get(UNAUTH_VERSION) {
            Ok(Some(bytes)) if bytes.len() == 4 => u32::from_le_bytes(bytes.try_into().unwrap()),
            _ => self.lock_version,
        }
    }

    fn read_storage_salt(&self) -> Result<[u8; STORAGE_SALT_SIZE], StorageError> {
        let record = self.log.get(EDEK_PVC)?.ok_or(StorageError::Fault("no EDEK"))?;
        if record.len() < STORAGE_SALT_SIZE {
            return Err(StorageError::Fault("no EDEK"));
        }
        let mut salt = [0u8; STORAGE_SALT_SIZE];
        salt.copy_from_slice(&record[..STORAGE_SALT_SIZE]);
        Ok(salt)
    }

    fn decrypted_version(&self) -> Result<u32, StorageError> {
        let bytes = self
            .get_encrypted(VERSION)?
            .ok_or(StorageError::Fault("storage version check"))?;
        if bytes.len() != 4 {
            return Err(StorageError::Fault("storage version check"));
        }
        Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
    }

    /// Always succeeds. Zeroizes cached keys and the authentication sum.
    pub fn lock(&mut self) {
        self.session.lock();
    }

    pub fn is_unlocked(&self) -> bool {
        self.session.unlocked
    }

    pub fn has_pin(&self) -> bool {
        match self.log.get(PIN_NOT_SET) {
            Ok(Some(v)) if !v.is_empty() => v[0] != TRUE_BYTE,
            Ok(_) => true,
            Err(_) => false,
        }
    }

    pub fn get_pin_rem(&self) -> u32 {
        match self.pin_fails.get_fails() {
            Ok(ctr) => PIN_MAX_TRIES.saturating_sub(ctr),
            Err(_) => 0,
        }
    }

    pub fn change_pin(
        &mut self,
        old_pin: &[u8],
        new_pin: &[u8],
        old_ext_salt: Option<&[u8; EXTERNAL_SALT_SIZE]>,
        new_ext_salt: Option<&[u8; EXTERNAL_SALT_SIZE]>,
        progress: &mut dyn ProgressCallback,
        delay: &mut dyn Delay,
        faults: &mut dyn FaultScreens,
    ) -> Result<bool, StorageError> {
        if !self.unlock(old_pin, old_ext_salt, progress, delay, faults)? {
            return Ok(false);
        }
        if !self.is_not_wipe_code(new_pin)? {
            return Ok(false);
        }
        self.set_pin(new_pin, new_ext_salt.map(|s| s.as_slice()), progress)?;
        Ok(true)
    }

    /// Wipes and shows the wipe-code screen if `pin` matches the stored
    /// wipe code.
    pub fn ensure_not_wipe_code(&mut self, pin: &[u8], faults: &mut dyn FaultScreens) -> Result<(), StorageError> {
        let unlock_pin;
        let pin = if self.read_lock_version() <= 2 {
            unlock_pin = pin_to_int(pin).to_le_bytes();
            &unlock_pin[..]
        } else {
            pin
        };
        match self.is_not_wipe_code(pin) {
            Ok(true) => Ok(()),
            Ok(false) => {
                let _ = self.wipe_internal();
                faults.show_wipe_code_screen();
                Err(StorageError::Fault("wipe code entered"))
            }
            Err(e) => Err(self.propagate_fault(e, faults)),
        }
    }

    pub fn has_wipe_code(&mut self) -> bool {
        if !self.session.unlocked {
            return false;
        }
        self.is_not_wipe_code(WIPE_CODE_EMPTY).unwrap_or(true)
    }

    pub fn change_wipe_code(
        &mut self,
        pin: &[u8],
        ext_salt: Option<&[u8; EXTERNAL_SALT_SIZE]>,
        wipe_code: &[u8],
        progress: &mut dyn ProgressCallback,
        delay: &mut dyn Delay,
        faults: &mut dyn FaultScreens,
    ) -> Result<bool, StorageError> {
        if !pin.is_empty() && pin == wipe_code {
            return Ok(false);
        }
        if !self.unlock(pin, ext_salt, progress, delay, faults)? {
            return Ok(false);
        }
        self.set_wipe_code(wipe_code)?;
        Ok(true)
    }

    // ---- record API -------------------------------------------------

    pub fn get(&mut self, app: u8, item: u8, faults: &mut dyn FaultScreens) -> Result<Option<Vec<u8>>, StorageError> {
        let key = make_key(app, item);
        if app == crate::log::APP_STORAGE || !self.app_allowed(app) {
            return Ok(None);
        }
        if is_public(key) {
            return Ok(self.log.get(key)?);
        }
        if !self.session.unlocked {
            return Ok(None);
        }
        match self.get_encrypted(key) {
            Ok(v) => Ok(v),
            Err(e) => Err(self.propagate_fault(e, faults)),
        }
    }

    pub fn set(&mut self, app: u8, item: u8, data: &[u8], faults: &mut dyn FaultScreens) -> Result<bool, StorageError> {
        let key = make_key(app, item);
        if app == crate::log::APP_STORAGE || !self.app_allowed(app) {
            return Ok(false);
        }
        if !self.session.unlocked && !is_write_locked(key) {
            return Ok(false);
        }
        if is_public(key) {
            self.log.set(key, data)?;
            return Ok(true);
        }
        if data.len() > MAX_ENCRYPTED_VALUE_LEN {
            return Err(StorageError::ValueTooLarge(data.len()));
        }
        match self.set_encrypted(key, data) {
            Ok(()) => Ok(true),
            Err(e) => Err(self.propagate_fault(e, faults)),
        }
    }

    pub fn has(&self, app: u8, item: u8) -> bool {
        let key = make_key(app, item);
        if app == crate::log::APP_STORAGE || !self.app_allowed(app) {
            return false;
        }
        if is_public(key) {
            return matches!(self.log.get(key), Ok(Some(_)));
        }
        if !self.session.unlocked {
            return false;
        }
        matches!(self.log.get(key), Ok(Some(_)))
    }

    pub fn delete(&mut self, app: u8, item: u8, faults: &mut dyn FaultScreens) -> Result<bool, StorageError> {
        let key = make_key(app, item);
        if app == crate::log::APP_STORAGE || !self.app_allowed(app) {
            return Ok(false);
        }
        if !self.session.unlocked && !is_write_locked(key) {
            return Ok(false);
        }
        self.log.delete(key)?;
        if is_protected(key) {
            let sak = self.sak()?;
            if let Err(e) = auth_update(&mut self.log, &sak, &mut self.session.auth, key) {
                return Err(self.propagate_fault(e, faults));
            }
        }
        Ok(true)
    }

    pub fn set_counter(&mut self, app: u8, item: u8, value: u32) -> Result<bool, StorageError> {
        let key = make_key(app, item);
        if !is_public(key) || app == crate::log::APP_STORAGE || !self.app_allowed(app) {
            return Ok(false);
        }
        if !self.session.unlocked && !is_write_locked(key) {
            return Ok(false);
        }
        self.log.set_counter(key, value)?;
        Ok(true)
    }

    pub fn next_counter(&mut self, app: u8, item: u8) -> Result<Option<u32>, StorageError> {
        let key = make_key(app, item);
        if !is_public(key) || app == crate::log::APP_STORAGE || !self.app_allowed(app) {
            return Ok(None);
        }
        if !self.session.unlocked && !is_write_locked(key) {
            return Ok(None);
        }
        Ok(Some(self.log.next_counter(key)?))
    }

    pub fn wipe(&mut self) -> Result<(), StorageError> {
        self.wipe_internal()
    }

    // ---- upgrade path -------------------------------------------------

    fn storage_upgrade(&mut self, active_version: u32, progress: &mut dyn ProgressCallback) -> Result<(), StorageError> {
        if active_version == 0 {
            // Snapshot the pre-upgrade log before writing a single reserved
            // key of our own, so the copy loop below only ever sees genuine
            // v0 user records plus the two legacy bookkeeping keys it
            // explicitly excludes.
            let snapshot = self.log.snapshot()?;

            let mut dek_sak = [0u8; KEYS_SIZE];
            random_buffer(&mut dek_sak);
            self.session.unlock_with(dek_sak, AuthState::zero());
            dek_sak.zeroize();

            let sak = self.sak()?;
            self.session.auth = auth_init(&mut self.log, &sak)?;
            self.set_encrypted(VERSION, &1u32.to_le_bytes())?;

            let legacy_pin = self.log.get(V0_PIN_KEY)?;
            match legacy_pin {
                Some(bytes) if bytes.len() == 4 && u32::from_le_bytes(bytes.clone().try_into().unwrap()) != crate::constants::V0_PIN_EMPTY => {
                    let pin_bytes = bytes;
                    self.set_pin(&pin_bytes, None, progress)?;
                }
                _ => {
                    self.set_pin(&[], None, progress)?;
                    self.log.set(PIN_NOT_SET, &[TRUE_BYTE])?;
                }
            }

            let fail_bytes = self.log.get(v0_pin_fail_key())?.unwrap_or_default();
            let fails = v0_pin_get_fails(&fail_bytes);
            self.pin_fails.init(fails)?;

            for (key, val) in snapshot {
                if key == V0_PIN_KEY || key == v0_pin_fail_key() {
                    continue;
                }
                if is_public(key) {
                    self.log.set(key, &val)?;
                } else {
                    self.set_encrypted(key, &val)?;
                }
            }

            self.session.lock();
        }

        if active_version <= 1 {
            self.set_wipe_code(&[])?;
        }

        if active_version <= 2 {
            let mut version = 1u32;
            if let Some(marker) = self.log.get(STORAGE_UPGRADED)? {
                if marker.len() == 4 && u32::from_le_bytes(marker.try_into().unwrap()) == FALSE_WORD {
                    version = 2;
                }
            }
            self.log.set(UNAUTH_VERSION, &version.to_le_bytes())?;
        }

        self.log
            .set(STORAGE_UPGRADED, &crate::constants::TRUE_WORD.to_le_bytes())?;
        self.log.upgrade_finish()?;
        Ok(())
    }

    fn storage_upgrade_unlocked(
        &mut self,
        pin: &[u8],
        ext_salt: Option<&[u8; EXTERNAL_SALT_SIZE]>,
    ) -> Result<(), StorageError> {
        let version = self.decrypted_version()?;

        if version <= 2 {
            self.set_pin(pin, ext_salt.map(|s| s.as_slice()), &mut crate::progress::NullProgress)?;
        }

        if version == 2 {
            let wipe_code_data = self
                .log
                .get(WIPE_CODE_DATA)?
                .ok_or(StorageError::Fault("no wipe code"))?;
            if wipe_code_data.len() < 4 {
                return Err(StorageError::Fault("no wipe code"));
            }
            let legacy_value = u32::from_le_bytes(wipe_code_data[..4].try_into().unwrap());
            let wipe_code = int_to_wipe_code(legacy_value).ok_or(StorageError::Fault("invalid wipe code"))?;
            self.set_wipe_code(&wipe_code)?;
        }

        // VERSION itself is deliberately left at its pre-upgrade value here:
        // `check_storage_version` (run right after this by the caller) is
        // the only place allowed to bump it, since it needs the inequality
        // against `STORAGE_UPGRADED` to tell a genuine upgrade apart from a
        // skipped-marker attack.
        Ok(())
    }
}

fn bytes_to_words32(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
        .collect()
}

fn v0_pin_fail_key() -> u16 {
    crate::pin_fail::PIN_FAIL_KEY
}
