use anchor_lang::prelude::*;
use anchor_lang::solana_program::program::invoke;
use anchor_lang::solana_program::system_instruction;

declare_id!("BiKeC39hKTCgvmwcBMxiXNkHfS24B4fWhkP6w5DVVXxW");

#[cfg(not(feature = "no-entrypoint"))]
use solana_security_txt::security_txt;

#[cfg(not(feature = "no-entrypoint"))]
security_txt! {
    name: "Slot Pool",
    project_url: "https://github.com/slot-pool/slot-pool",
    contacts: "link:https://github.com/slot-pool/slot-pool/security/advisories/new",
    policy: "https://github.com/slot-pool/slot-pool/blob/main/SECURITY.md",
    preferred_languages: "en",
    source_code: "https://github.com/slot-pool/slot-pool",
    auditors: "Unaudited. Winning slot is supplied by the revealing authority (off-chain trust)"
}


// ── Constants ─────────────────────────────────────────────────────────────
pub const TOTAL_SLOTS:           u8    = 25;        // slots are numbered 1..=25
pub const MAX_PLAYERS:           usize = 100;       // hard cap per round
pub const MIN_PLAYERS_TO_REVEAL: u8    = 2;         // no single-party "wins"
pub const ARBITER_LOCK_SENTINEL: i64   = i64::MAX;  // lock_time stored in arbiter mode
pub const POOL_SEED:             &[u8] = b"pool";

// ── Round lifecycle ───────────────────────────────────────────────────────
//
//   create_pool ──► Open ──join_pool──► Open
//                    │
//                    ├─reveal_winner──► Revealed ──claim_winnings (per winner)
//                    │
//                    └─cancel_pool───► Cancelled ──claim_refund (per player)
//
//   close_pool once every eligible participant has withdrawn.
//
// Funds only move on join (in), claim (out, winners) and refund (out, all).
// Reveal never moves funds: payout is pulled by each winner so no single
// instruction has to iterate and pay up to 100 accounts.

#[program]
pub mod slot_pool {
    use super::*;

    // ── Create ────────────────────────────────────────────────────
    pub fn create_pool(
        ctx: Context<CreatePool>,
        seed:         u64,
        min_deposit:  u64,
        arbiter:      Pubkey,   // ignored by automatic rounds (pass any placeholder)
        lock_time:    i64,      // ignored by arbiter rounds
        is_automatic: bool,
    ) -> Result<()> {
        let now     = Clock::get()?.unix_timestamp;
        let creator = ctx.accounts.creator.key();

        let pool = PoolEscrow::open(
            creator, arbiter, min_deposit, lock_time, is_automatic, ctx.bumps.pool, now,
        )?;

        msg!("Pool created by: {}", creator);
        msg!("Min deposit: {} lamports", pool.min_deposit);
        match pool.mode() {
            RevealMode::Automatic { lock_time } => msg!("Automatic round, locks at {}", lock_time),
            RevealMode::Arbiter { authority }   => msg!("Arbiter round, arbiter: {}", authority),
        }

        emit!(PoolCreated {
            pool: ctx.accounts.pool.key(),
            creator,
            seed,
            arbiter: pool.arbiter,
            min_deposit: pool.min_deposit,
            lock_time: pool.lock_time,
            is_automatic: pool.is_automatic,
        });

        ctx.accounts.pool.set_inner(pool);
        Ok(())
    }

    // ── Join ──────────────────────────────────────────────────────
    pub fn join_pool(
        ctx: Context<JoinPool>,
        chosen_slot:    u8,
        deposit_amount: u64,
    ) -> Result<()> {
        let now = Clock::get()?.unix_timestamp;

        // Cache keys before mutable borrow
        let player_key = ctx.accounts.player.key();
        let pool_key   = ctx.accounts.pool.key();
        let player_ai  = ctx.accounts.player.to_account_info();
        let pool_ai    = ctx.accounts.pool.to_account_info();

        let pool = &mut ctx.accounts.pool;
        pool.record_join(player_key, chosen_slot, deposit_amount, now)?;

        // ── Transfer SOL player → escrow ─────────────────────────
        let ix = system_instruction::transfer(&player_key, &pool_key, deposit_amount);
        invoke(&ix, &[player_ai, pool_ai])?;

        msg!("Player {} joined on slot {} with {} lamports", player_key, chosen_slot, deposit_amount);
        msg!("Total pool: {} lamports, players: {}", pool.total_pool, pool.player_count);

        emit!(PlayerJoined {
            pool: pool_key,
            player: player_key,
            slot: chosen_slot,
            deposit: deposit_amount,
            total_pool: pool.total_pool,
            player_count: pool.player_count,
        });
        Ok(())
    }

    // ── Reveal (arbiter, or creator/arbiter once an automatic round locks) ──
    pub fn reveal_winner(ctx: Context<RevealWinner>, winner_slot: u8) -> Result<()> {
        let now       = Clock::get()?.unix_timestamp;
        let authority = ctx.accounts.authority.key();
        let pool_key  = ctx.accounts.pool.key();

        let pool = &mut ctx.accounts.pool;
        let winner_stake = pool.reveal(authority, winner_slot, now)?;
        let winners = pool.entries().filter(|e| e.slot == winner_slot).count() as u8;

        msg!("Winning slot revealed: {}", winner_slot);
        msg!("Winners: {}, winning stake: {} lamports of {}", winners, winner_stake, pool.total_pool);

        emit!(WinnerRevealed {
            pool: pool_key,
            authority,
            winner_slot,
            winners,
            winner_stake,
            total_pool: pool.total_pool,
        });
        Ok(())
    }

    // ── Claim (one winner, proportional share of the whole pool) ──
    pub fn claim_winnings(ctx: Context<ClaimWinnings>) -> Result<()> {
        let player_key = ctx.accounts.player.key();
        let pool_key   = ctx.accounts.pool.key();
        let player_ai  = ctx.accounts.player.to_account_info();
        let pool_ai    = ctx.accounts.pool.to_account_info();

        let pool   = &mut ctx.accounts.pool;
        let payout = pool.settle_claim(&player_key)?;
        release_from_escrow(&pool_ai, &player_ai, payout)?;

        msg!("Player {} claimed {} lamports", player_key, payout);

        emit!(WinningsClaimed { pool: pool_key, player: player_key, payout });
        Ok(())
    }

    // ── Cancel (creator only, while open and not locked) ──────────
    pub fn cancel_pool(ctx: Context<CancelPool>) -> Result<()> {
        let now      = Clock::get()?.unix_timestamp;
        let pool_key = ctx.accounts.pool.key();
        let pool     = &mut ctx.accounts.pool;
        pool.cancel(ctx.accounts.creator.key(), now)?;

        msg!("Pool cancelled, {} players may claim refunds totalling {} lamports",
             pool.player_count, pool.total_pool);

        emit!(PoolCancelled {
            pool: pool_key,
            player_count: pool.player_count,
            total_pool: pool.total_pool,
        });
        Ok(())
    }

    // ── Refund (one participant of a cancelled round, exact deposit) ──
    pub fn claim_refund(ctx: Context<ClaimRefund>) -> Result<()> {
        let player_key = ctx.accounts.player.key();
        let pool_key   = ctx.accounts.pool.key();
        let player_ai  = ctx.accounts.player.to_account_info();
        let pool_ai    = ctx.accounts.pool.to_account_info();

        let pool   = &mut ctx.accounts.pool;
        let amount = pool.settle_refund(&player_key)?;
        release_from_escrow(&pool_ai, &player_ai, amount)?;

        msg!("Refunded {} lamports to {}", amount, player_key);

        emit!(RefundClaimed { pool: pool_key, player: player_key, amount });
        Ok(())
    }

    // ── Close (creator reclaims rent + truncation dust once settled) ──
    pub fn close_pool(ctx: Context<ClosePool>) -> Result<()> {
        let pool = &ctx.accounts.pool;
        require!(pool.is_settled(), PoolError::ClaimsOutstanding);

        let reclaimed = pool.to_account_info().lamports();
        msg!("Pool closed, {} lamports returned to creator", reclaimed);

        emit!(PoolClosed {
            pool: pool.key(),
            creator: pool.creator,
            reclaimed,
        });
        Ok(())
    }
}

// ══════════════════════════════════════════════════════════════════════════
//  HELPERS
// ══════════════════════════════════════════════════════════════════════════

pub fn is_valid_slot(slot: u8) -> bool {
    (1..=TOTAL_SLOTS).contains(&slot)
}

/// floor(total_pool * deposit / winner_stake). The remainder stays in escrow.
pub fn proportional_share(total_pool: u64, deposit: u64, winner_stake: u64) -> Result<u64> {
    require!(winner_stake > 0, PoolError::NoWinners);
    let share = (total_pool as u128)
        .checked_mul(deposit as u128)
        .ok_or(PoolError::MathOverflow)?
        / winner_stake as u128;
    u64::try_from(share).map_err(|_| error!(PoolError::MathOverflow))
}

/// Move lamports out of the program-owned escrow. Never dips into the
/// rent-exempt reserve; that is returned to the creator by close_pool.
fn release_from_escrow(escrow_ai: &AccountInfo, recipient_ai: &AccountInfo, amount: u64) -> Result<()> {
    let rent      = Rent::get()?.minimum_balance(escrow_ai.data_len());
    let available = escrow_ai.lamports().saturating_sub(rent);
    require!(available >= amount, PoolError::InsufficientEscrow);

    **escrow_ai.try_borrow_mut_lamports()?    -= amount;
    **recipient_ai.try_borrow_mut_lamports()? += amount;
    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════
//  ACCOUNTS
// ══════════════════════════════════════════════════════════════════════════

#[derive(Accounts)]
#[instruction(seed: u64)]
pub struct CreatePool<'info> {
    #[account(init, payer = creator, space = 8 + PoolEscrow::INIT_SPACE,
              seeds = [POOL_SEED, creator.key().as_ref(), &seed.to_le_bytes()], bump)]
    pub pool: Account<'info, PoolEscrow>,
    #[account(mut)] pub creator: Signer<'info>,
    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
pub struct JoinPool<'info> {
    #[account(mut)] pub pool: Account<'info, PoolEscrow>,
    #[account(mut)] pub player: Signer<'info>,
    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
pub struct RevealWinner<'info> {
    #[account(mut)] pub pool: Account<'info, PoolEscrow>,
    /// Arbiter for arbiter rounds; creator or arbiter for automatic rounds
    pub authority: Signer<'info>,
}

#[derive(Accounts)]
pub struct ClaimWinnings<'info> {
    #[account(mut)] pub pool: Account<'info, PoolEscrow>,
    #[account(mut)] pub player: Signer<'info>,
}

#[derive(Accounts)]
pub struct CancelPool<'info> {
    #[account(mut)] pub pool: Account<'info, PoolEscrow>,
    pub creator: Signer<'info>,
}

#[derive(Accounts)]
pub struct ClaimRefund<'info> {
    #[account(mut)] pub pool: Account<'info, PoolEscrow>,
    #[account(mut)] pub player: Signer<'info>,
}

#[derive(Accounts)]
pub struct ClosePool<'info> {
    #[account(mut, close = creator, has_one = creator @ PoolError::Unauthorized)]
    pub pool: Account<'info, PoolEscrow>,
    #[account(mut)] pub creator: Signer<'info>,
}

// ══════════════════════════════════════════════════════════════════════════
//  STATE
// ══════════════════════════════════════════════════════════════════════════

/// One betting round. Field order is the wire layout external readers parse
/// by offset (discriminator, creator @8, arbiter @40, min_deposit @72, ...),
/// so new fields may only be appended.
#[account]
#[derive(InitSpace, Debug, PartialEq)]
pub struct PoolEscrow {
    pub creator:       Pubkey,           // 32
    pub arbiter:       Pubkey,           // 32, inert in automatic rounds
    pub min_deposit:   u64,              // 8
    pub total_pool:    u64,              // 8  == sum(deposits)
    pub lock_time:     i64,              // 8, ARBITER_LOCK_SENTINEL in arbiter rounds
    pub winner_slot:   Option<u8>,       // 1 + 1, Some iff Revealed
    pub status:        PoolStatus,       // 1
    pub player_count:  u8,               // 1
    pub bump:          u8,               // 1
    pub is_automatic:  bool,             // 1
    // Parallel arrays, index i describes one participant. Only push_entry
    // appends to them and only settle_* flip a claimed flag.
    #[max_len(100)]
    pub players:       Vec<Pubkey>,      // 4 + 32 * 100
    #[max_len(100)]
    pub chosen_blocks: Vec<u8>,          // 4 + 1 * 100
    #[max_len(100)]
    pub deposits:      Vec<u64>,         // 4 + 8 * 100
    #[max_len(100)]
    pub claimed:       Vec<bool>,        // 4 + 1 * 100, "refunded" once Cancelled
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq, InitSpace)]
pub enum PoolStatus {
    Open,
    Revealed,
    Cancelled,
}

/// Who may reveal, and when. Derived from `is_automatic` plus whichever of
/// `lock_time` / `arbiter` is meaningful for the round.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RevealMode {
    Automatic { lock_time: i64 },
    Arbiter { authority: Pubkey },
}

/// Record view over one index of the parallel arrays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Entry {
    pub player:  Pubkey,
    pub slot:    u8,
    pub deposit: u64,
    pub claimed: bool,
}

impl PoolEscrow {
    pub fn open(
        creator:      Pubkey,
        arbiter:      Pubkey,
        min_deposit:  u64,
        lock_time:    i64,
        is_automatic: bool,
        bump:         u8,
        now:          i64,
    ) -> Result<Self> {
        require!(min_deposit > 0, PoolError::InvalidDepositAmount);

        let lock_time = if is_automatic {
            require!(lock_time > now, PoolError::InvalidLockTime);
            lock_time
        } else {
            require!(
                arbiter != Pubkey::default() && arbiter != creator,
                PoolError::InvalidArbiter
            );
            ARBITER_LOCK_SENTINEL
        };

        Ok(Self {
            creator,
            arbiter,
            min_deposit,
            total_pool: 0,
            lock_time,
            winner_slot: None,
            status: PoolStatus::Open,
            player_count: 0,
            bump,
            is_automatic,
            players: Vec::new(),
            chosen_blocks: Vec::new(),
            deposits: Vec::new(),
            claimed: Vec::new(),
        })
    }

    pub fn mode(&self) -> RevealMode {
        if self.is_automatic {
            RevealMode::Automatic { lock_time: self.lock_time }
        } else {
            RevealMode::Arbiter { authority: self.arbiter }
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = Entry> + '_ {
        self.players
            .iter()
            .zip(&self.chosen_blocks)
            .zip(&self.deposits)
            .zip(&self.claimed)
            .map(|(((player, slot), deposit), claimed)| Entry {
                player:  *player,
                slot:    *slot,
                deposit: *deposit,
                claimed: *claimed,
            })
    }

    pub fn entry(&self, index: usize) -> Option<Entry> {
        Some(Entry {
            player:  *self.players.get(index)?,
            slot:    *self.chosen_blocks.get(index)?,
            deposit: *self.deposits.get(index)?,
            claimed: *self.claimed.get(index)?,
        })
    }

    pub fn position_of(&self, player: &Pubkey) -> Option<usize> {
        self.players.iter().position(|p| p == player)
    }

    /// Sum of deposits placed on `slot`.
    pub fn stake_on(&self, slot: u8) -> Result<u64> {
        let stake = self
            .entries()
            .filter(|e| e.slot == slot)
            .try_fold(0u64, |acc, e| acc.checked_add(e.deposit));
        stake.ok_or_else(|| error!(PoolError::MathOverflow))
    }

    pub fn winner_stake_sum(&self) -> Result<u64> {
        let winner = self.winner_slot.ok_or(PoolError::PoolNotRevealed)?;
        self.stake_on(winner)
    }

    /// What the participant at `index` is owed once revealed, claimed or not.
    pub fn payout_for(&self, index: usize) -> Result<u64> {
        let winner = self.winner_slot.ok_or(PoolError::PoolNotRevealed)?;
        let entry  = self.entry(index).ok_or(PoolError::PlayerNotFound)?;
        require!(entry.slot == winner, PoolError::NotAWinner);
        proportional_share(self.total_pool, entry.deposit, self.stake_on(winner)?)
    }

    /// True once every participant owed lamports has withdrawn them.
    pub fn is_settled(&self) -> bool {
        match self.status {
            PoolStatus::Open      => false,
            PoolStatus::Revealed  => self
                .entries()
                .filter(|e| Some(e.slot) == self.winner_slot)
                .all(|e| e.claimed),
            PoolStatus::Cancelled => self.entries().all(|e| e.claimed),
        }
    }

    pub fn record_join(&mut self, player: Pubkey, slot: u8, deposit: u64, now: i64) -> Result<()> {
        require!(self.status == PoolStatus::Open,   PoolError::PoolNotOpen);
        require!(is_valid_slot(slot),               PoolError::InvalidSlot);
        require!(deposit >= self.min_deposit,       PoolError::InsufficientDeposit);
        require!(self.players.len() < MAX_PLAYERS,  PoolError::PoolFull);
        require!(self.position_of(&player).is_none(), PoolError::AlreadyJoined);
        if let RevealMode::Automatic { lock_time } = self.mode() {
            require!(now < lock_time, PoolError::JoinWindowClosed);
        }

        let total_pool = self.total_pool.checked_add(deposit).ok_or(PoolError::MathOverflow)?;
        self.push_entry(Entry { player, slot, deposit, claimed: false });
        self.total_pool = total_pool;
        Ok(())
    }

    /// Fix the outcome. Returns the winning stake.
    pub fn reveal(&mut self, authority: Pubkey, slot: u8, now: i64) -> Result<u64> {
        require!(self.status == PoolStatus::Open, PoolError::PoolNotOpen);
        require!(is_valid_slot(slot),             PoolError::InvalidSlot);
        match self.mode() {
            RevealMode::Automatic { lock_time } => {
                require!(
                    authority == self.creator || authority == self.arbiter,
                    PoolError::Unauthorized
                );
                require!(now >= lock_time, PoolError::TooEarlyToReveal);
            }
            RevealMode::Arbiter { authority: arbiter } => {
                require_keys_eq!(authority, arbiter, PoolError::Unauthorized);
            }
        }
        require!(self.player_count >= MIN_PLAYERS_TO_REVEAL, PoolError::NotEnoughPlayers);

        let winner_stake = self.stake_on(slot)?;
        require!(winner_stake > 0, PoolError::NoWinners);

        self.winner_slot = Some(slot);
        self.status      = PoolStatus::Revealed;
        Ok(winner_stake)
    }

    /// Mark the caller's winnings as paid and return the amount to transfer.
    pub fn settle_claim(&mut self, player: &Pubkey) -> Result<u64> {
        require!(self.status == PoolStatus::Revealed, PoolError::PoolNotRevealed);
        let index  = self.position_of(player).ok_or(PoolError::PlayerNotFound)?;
        let payout = self.payout_for(index)?;
        require!(!self.claimed[index], PoolError::AlreadyClaimed);

        self.claimed[index] = true;
        Ok(payout)
    }

    /// Once an automatic round has locked with enough players to reveal,
    /// the outcome can only be settled by reveal_winner.
    pub fn cancel(&mut self, caller: Pubkey, now: i64) -> Result<()> {
        require!(self.status == PoolStatus::Open, PoolError::PoolNotOpen);
        require_keys_eq!(caller, self.creator, PoolError::Unauthorized);
        if let RevealMode::Automatic { lock_time } = self.mode() {
            require!(
                now < lock_time || self.player_count < MIN_PLAYERS_TO_REVEAL,
                PoolError::PoolLocked
            );
        }
        self.status = PoolStatus::Cancelled;
        Ok(())
    }

    /// Mark the caller's deposit as refunded and return it.
    pub fn settle_refund(&mut self, player: &Pubkey) -> Result<u64> {
        require!(self.status == PoolStatus::Cancelled, PoolError::PoolNotCancelled);
        let index = self.position_of(player).ok_or(PoolError::PlayerNotFound)?;
        require!(!self.claimed[index], PoolError::AlreadyClaimed);

        self.claimed[index] = true;
        Ok(self.deposits[index])
    }

    fn push_entry(&mut self, entry: Entry) {
        self.players.push(entry.player);
        self.chosen_blocks.push(entry.slot);
        self.deposits.push(entry.deposit);
        self.claimed.push(entry.claimed);
        self.player_count = self.players.len() as u8;
    }
}

// ══════════════════════════════════════════════════════════════════════════
//  ERRORS & EVENTS
// ══════════════════════════════════════════════════════════════════════════

#[error_code]
pub enum PoolError {
    #[msg("Minimum deposit must be greater than zero")]
    InvalidDepositAmount,
    #[msg("Lock time must be in the future")]
    InvalidLockTime,
    #[msg("Arbiter must be a real key distinct from the creator")]
    InvalidArbiter,
    #[msg("Invalid slot (must be 1-25)")]
    InvalidSlot,
    #[msg("Deposit below pool minimum")]
    InsufficientDeposit,
    #[msg("Pool is not open")]
    PoolNotOpen,
    #[msg("Winner not revealed yet")]
    PoolNotRevealed,
    #[msg("Pool is not cancelled")]
    PoolNotCancelled,
    #[msg("Signer is not allowed to perform this action")]
    Unauthorized,
    #[msg("Pool has locked, joining is closed")]
    JoinWindowClosed,
    #[msg("Pool not locked yet")]
    TooEarlyToReveal,
    #[msg("Pool has locked with players in it, only a reveal can settle it")]
    PoolLocked,
    #[msg("Pool is full (max 100 players)")]
    PoolFull,
    #[msg("Player already joined this pool")]
    AlreadyJoined,
    #[msg("Not enough players (minimum 2)")]
    NotEnoughPlayers,
    #[msg("Nobody chose the winning slot")]
    NoWinners,
    #[msg("Player not found in this pool")]
    PlayerNotFound,
    #[msg("Not a winner")]
    NotAWinner,
    #[msg("Already claimed")]
    AlreadyClaimed,
    #[msg("Participants still have funds to withdraw")]
    ClaimsOutstanding,
    #[msg("Escrow balance cannot cover this transfer")]
    InsufficientEscrow,
    #[msg("Arithmetic overflow")]
    MathOverflow,
}

#[event] pub struct PoolCreated     { pub pool: Pubkey, pub creator: Pubkey, pub seed: u64, pub arbiter: Pubkey, pub min_deposit: u64, pub lock_time: i64, pub is_automatic: bool }
#[event] pub struct PlayerJoined    { pub pool: Pubkey, pub player: Pubkey, pub slot: u8, pub deposit: u64, pub total_pool: u64, pub player_count: u8 }
#[event] pub struct WinnerRevealed  { pub pool: Pubkey, pub authority: Pubkey, pub winner_slot: u8, pub winners: u8, pub winner_stake: u64, pub total_pool: u64 }
#[event] pub struct WinningsClaimed { pub pool: Pubkey, pub player: Pubkey, pub payout: u64 }
#[event] pub struct PoolCancelled   { pub pool: Pubkey, pub player_count: u8, pub total_pool: u64 }
#[event] pub struct RefundClaimed   { pub pool: Pubkey, pub player: Pubkey, pub amount: u64 }
#[event] pub struct PoolClosed      { pub pool: Pubkey, pub creator: Pubkey, pub reclaimed: u64 }
