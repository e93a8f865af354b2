//! PPU dispatch tables
//!
//! Every instruction word resolves through at most three table lookups to
//! an [`Entry`] carrying the handlers for one mnemonic. The tables are built
//! once on first use and never change afterwards; unmapped slots resolve to
//! the shared unknown entry.

use cf_core::error::PpuError;
use once_cell::sync::Lazy;

use crate::analyzer::{handlers as an, RegisterUsage};
use crate::instruction::Instruction;
use crate::interpreter::PpuInterpreter;
use crate::recompiler::Recompiler;
use crate::thread::PpuThread;

/// Interpreter handler
pub type InterpretFn = fn(&PpuInterpreter, &mut PpuThread, Instruction) -> Result<(), PpuError>;
/// Register-usage handler
pub type AnalyzeFn = fn(&mut RegisterUsage, Instruction);
/// HIR lowering handler
pub type RecompileFn = fn(&mut Recompiler<'_>, Instruction);

/// Sub-tables reachable from the primary table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableId {
    /// Primary 4, VA-form (bits 26-31)
    Table4,
    /// Primary 4, VX/VC-form (bits 21-31)
    Table4_,
    Table19,
    Table30,
    Table31,
    Table58,
    Table59,
    Table62,
    /// Primary 63, A-form (bits 26-30)
    Table63,
    /// Primary 63, X-form (bits 21-30)
    Table63_,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Invalid,
    Instruction,
    Table(TableId),
}

/// Resolved table slot
#[derive(Clone, Copy)]
pub struct Entry {
    pub name: &'static str,
    pub kind: EntryKind,
    pub interpret: InterpretFn,
    pub analyze: AnalyzeFn,
    pub recompile: RecompileFn,
}

impl Entry {
    const UNKNOWN: Entry = Entry {
        name: "unknown",
        kind: EntryKind::Invalid,
        interpret: crate::interpreter::unknown,
        analyze: an::none,
        recompile: crate::recompiler::unknown,
    };

    const fn table(id: TableId) -> Entry {
        Entry {
            name: "table",
            kind: EntryKind::Table(id),
            ..Entry::UNKNOWN
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.kind == EntryKind::Instruction
    }
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

macro_rules! op {
    ($name:literal, $group:ident :: $func:ident, $analyze:ident) => {
        Entry {
            name: $name,
            kind: EntryKind::Instruction,
            interpret: crate::instructions::$group::$func,
            analyze: an::$analyze,
            recompile: crate::recompiler::$group::$func,
        }
    };
    ($name:literal, $group:ident :: $func:ident, $analyze:ident, unlowered) => {
        Entry {
            name: $name,
            kind: EntryKind::Instruction,
            interpret: crate::instructions::$group::$func,
            analyze: an::$analyze,
            recompile: crate::recompiler::unlowered,
        }
    };
}

struct Tables {
    primary: Vec<Entry>,
    table4: Vec<Entry>,
    table4_: Vec<Entry>,
    table19: Vec<Entry>,
    table30: Vec<Entry>,
    table31: Vec<Entry>,
    table58: Vec<Entry>,
    table59: Vec<Entry>,
    table62: Vec<Entry>,
    table63: Vec<Entry>,
    table63_: Vec<Entry>,
}

static TABLES: Lazy<Tables> = Lazy::new(Tables::build);

/// Resolve an instruction word to its table entry
#[inline]
pub fn decode(instr: Instruction) -> &'static Entry {
    let tables = &*TABLES;
    let entry = &tables.primary[instr.opcode() as usize];
    match entry.kind {
        EntryKind::Table(id) => tables.lookup(id, instr),
        _ => entry,
    }
}

/// Mnemonic of an instruction word, `"unknown"` for decode misses
pub fn mnemonic(word: u32) -> &'static str {
    decode(Instruction(word)).name
}

/// Force table construction (otherwise done on first decode)
pub fn init_tables() {
    Lazy::force(&TABLES);
}

impl Tables {
    fn lookup(&self, id: TableId, instr: Instruction) -> &Entry {
        let entry = match id {
            TableId::Table4 => &self.table4[instr.op4() as usize],
            TableId::Table4_ => &self.table4_[instr.op4_() as usize],
            TableId::Table19 => &self.table19[instr.op19() as usize],
            TableId::Table30 => &self.table30[instr.op30() as usize],
            TableId::Table31 => &self.table31[instr.op31() as usize],
            TableId::Table58 => &self.table58[instr.op58() as usize],
            TableId::Table59 => &self.table59[instr.op59() as usize],
            TableId::Table62 => &self.table62[instr.op62() as usize],
            TableId::Table63 => &self.table63[instr.op63() as usize],
            TableId::Table63_ => &self.table63_[instr.op63_() as usize],
        };
        match entry.kind {
            EntryKind::Table(next) => self.lookup(next, instr),
            _ => entry,
        }
    }

    fn build() -> Self {
        let mut t = Tables {
            primary: vec![Entry::UNKNOWN; 0x40],
            table4: vec![Entry::table(TableId::Table4_); 0x40],
            table4_: vec![Entry::UNKNOWN; 0x800],
            table19: vec![Entry::UNKNOWN; 0x400],
            table30: vec![Entry::UNKNOWN; 0x8],
            table31: vec![Entry::UNKNOWN; 0x400],
            table58: vec![Entry::UNKNOWN; 0x4],
            table59: vec![Entry::UNKNOWN; 0x20],
            table62: vec![Entry::UNKNOWN; 0x4],
            table63: vec![Entry::table(TableId::Table63_); 0x20],
            table63_: vec![Entry::UNKNOWN; 0x400],
        };
        t.fill_primary();
        t.fill_table4();
        t.fill_table19();
        t.fill_table30();
        t.fill_table31();
        t.fill_table58_62();
        t.fill_table59();
        t.fill_table63();
        t
    }

    fn fill_primary(&mut self) {
        let p = &mut self.primary;
        p[0x02] = op!("tdi", system::tdi, trap_imm);
        p[0x03] = op!("twi", system::twi, trap_imm);
        p[0x04] = Entry::table(TableId::Table4);
        p[0x07] = op!("mulli", integer::mulli, rd_ra_imm);
        p[0x08] = op!("subfic", integer::subfic, rd_ra_imm_ca);
        p[0x0A] = op!("cmpli", integer::cmpli, cmp_imm);
        p[0x0B] = op!("cmpi", integer::cmpi, cmp_imm);
        p[0x0C] = op!("addic", integer::addic, rd_ra_imm_ca);
        p[0x0D] = op!("addic.", integer::addic_, rd_ra_ca_cr0);
        p[0x0E] = op!("addi", integer::addi, rd_ra0);
        p[0x0F] = op!("addis", integer::addis, rd_ra0);
        p[0x10] = op!("bc", branch::bc, bc);
        p[0x11] = op!("sc", system::sc, sc);
        p[0x12] = op!("b", branch::b, b);
        p[0x13] = Entry::table(TableId::Table19);
        p[0x14] = op!("rlwimi", integer::rlwimi, ra_rs_insert);
        p[0x15] = op!("rlwinm", integer::rlwinm, ra_rs);
        p[0x17] = op!("rlwnm", integer::rlwnm, ra_rs_rb);
        p[0x18] = op!("ori", integer::ori, ra_rs_imm);
        p[0x19] = op!("oris", integer::oris, ra_rs_imm);
        p[0x1A] = op!("xori", integer::xori, ra_rs_imm);
        p[0x1B] = op!("xoris", integer::xoris, ra_rs_imm);
        p[0x1C] = op!("andi.", integer::andi_, ra_rs_cr0);
        p[0x1D] = op!("andis.", integer::andis_, ra_rs_cr0);
        p[0x1E] = Entry::table(TableId::Table30);
        p[0x1F] = Entry::table(TableId::Table31);
        p[0x20] = op!("lwz", load_store::lwz, load_d);
        p[0x21] = op!("lwzu", load_store::lwzu, load_du);
        p[0x22] = op!("lbz", load_store::lbz, load_d);
        p[0x23] = op!("lbzu", load_store::lbzu, load_du);
        p[0x24] = op!("stw", load_store::stw, store_d);
        p[0x25] = op!("stwu", load_store::stwu, store_du);
        p[0x26] = op!("stb", load_store::stb, store_d);
        p[0x27] = op!("stbu", load_store::stbu, store_du);
        p[0x28] = op!("lhz", load_store::lhz, load_d);
        p[0x29] = op!("lhzu", load_store::lhzu, load_du);
        p[0x2A] = op!("lha", load_store::lha, load_d);
        p[0x2B] = op!("lhau", load_store::lhau, load_du);
        p[0x2C] = op!("sth", load_store::sth, store_d);
        p[0x2D] = op!("sthu", load_store::sthu, store_du);
        p[0x2E] = op!("lmw", load_store::lmw, lmw);
        p[0x2F] = op!("stmw", load_store::stmw, stmw);
        p[0x30] = op!("lfs", load_store::lfs, load_fd);
        p[0x31] = op!("lfsu", load_store::lfsu, load_fdu);
        p[0x32] = op!("lfd", load_store::lfd, load_fd);
        p[0x33] = op!("lfdu", load_store::lfdu, load_fdu);
        p[0x34] = op!("stfs", load_store::stfs, store_fd);
        p[0x35] = op!("stfsu", load_store::stfsu, store_fdu);
        p[0x36] = op!("stfd", load_store::stfd, store_fd);
        p[0x37] = op!("stfdu", load_store::stfdu, store_fdu);
        p[0x3A] = Entry::table(TableId::Table58);
        p[0x3B] = Entry::table(TableId::Table59);
        p[0x3E] = Entry::table(TableId::Table62);
        p[0x3F] = Entry::table(TableId::Table63);
    }

    fn fill_table4(&mut self) {
        let va = &mut self.table4;
        va[42] = op!("vsel", vector::vsel, vd_va_vb_vc);
        va[43] = op!("vperm", vector::vperm, vd_va_vb_vc, unlowered);
        va[46] = op!("vmaddfp", vector::vmaddfp, vd_va_vb_vc);

        let vx = &mut self.table4_;
        vx[0] = op!("vaddubm", vector::vaddubm, vd_va_vb);
        vx[10] = op!("vaddfp", vector::vaddfp, vd_va_vb);
        vx[64] = op!("vadduhm", vector::vadduhm, vd_va_vb);
        vx[74] = op!("vsubfp", vector::vsubfp, vd_va_vb);
        vx[128] = op!("vadduwm", vector::vadduwm, vd_va_vb);
        vx[134] = op!("vcmpequw", vector::vcmpequw, vd_va_vb_cr6);
        vx[134 | 0x400] = op!("vcmpequw.", vector::vcmpequw, vd_va_vb_cr6);
        vx[652] = op!("vspltw", vector::vspltw, vd_vb);
        vx[908] = op!("vspltisw", vector::vspltisw, vd);
        vx[1024] = op!("vsububm", vector::vsububm, vd_va_vb);
        vx[1028] = op!("vand", vector::vand, vd_va_vb);
        vx[1088] = op!("vsubuhm", vector::vsubuhm, vd_va_vb);
        vx[1092] = op!("vandc", vector::vandc, vd_va_vb);
        vx[1152] = op!("vsubuwm", vector::vsubuwm, vd_va_vb);
        vx[1156] = op!("vor", vector::vor, vd_va_vb);
        vx[1220] = op!("vxor", vector::vxor, vd_va_vb);
        vx[1284] = op!("vnor", vector::vnor, vd_va_vb);
        vx[1540] = op!("mfvscr", vector::mfvscr, vd, unlowered);
        vx[1604] = op!("mtvscr", vector::mtvscr, vb, unlowered);
    }

    fn fill_table19(&mut self) {
        let t = &mut self.table19;
        t[0x000] = op!("mcrf", branch::mcrf, mcrf);
        t[0x010] = op!("bclr", branch::bclr, bclr);
        t[0x021] = op!("crnor", branch::crnor, cr_logic);
        t[0x081] = op!("crandc", branch::crandc, cr_logic);
        t[0x096] = op!("isync", system::isync, none);
        t[0x0C1] = op!("crxor", branch::crxor, cr_logic);
        t[0x0E1] = op!("crnand", branch::crnand, cr_logic);
        t[0x101] = op!("crand", branch::crand, cr_logic);
        t[0x121] = op!("creqv", branch::creqv, cr_logic);
        t[0x1A1] = op!("crorc", branch::crorc, cr_logic);
        t[0x1C1] = op!("cror", branch::cror, cr_logic);
        t[0x210] = op!("bcctr", branch::bcctr, bcctr);
    }

    fn fill_table30(&mut self) {
        let t = &mut self.table30;
        t[0] = op!("rldicl", integer::rldicl, ra_rs);
        t[1] = op!("rldicr", integer::rldicr, ra_rs);
        t[2] = op!("rldic", integer::rldic, ra_rs);
        t[3] = op!("rldimi", integer::rldimi, ra_rs_insert);
        t[4] = op!("rldc_lr", integer::rldc_lr, ra_rs_rb);
    }

    fn fill_table31(&mut self) {
        let t = &mut self.table31;

        // XO-form arithmetic is reachable with and without OE
        let mut xo = |index: usize, entry: Entry| {
            t[index] = entry;
            t[index | 0x200] = entry;
        };
        xo(0x008, op!("subfc", integer::subfcx, rd_ra_rb_ca));
        xo(0x00A, op!("addc", integer::addcx, rd_ra_rb_ca));
        xo(0x028, op!("subf", integer::subfx, rd_ra_rb));
        xo(0x068, op!("neg", integer::negx, rd_ra));
        xo(0x088, op!("subfe", integer::subfex, rd_ra_rb_ca));
        xo(0x08A, op!("adde", integer::addex, rd_ra_rb_ca));
        xo(0x0C8, op!("subfze", integer::subfzex, rd_ra_ca));
        xo(0x0CA, op!("addze", integer::addzex, rd_ra_ca));
        xo(0x0E8, op!("subfme", integer::subfmex, rd_ra_ca));
        xo(0x0E9, op!("mulld", integer::mulldx, rd_ra_rb));
        xo(0x0EA, op!("addme", integer::addmex, rd_ra_ca));
        xo(0x0EB, op!("mullw", integer::mullwx, rd_ra_rb));
        xo(0x10A, op!("add", integer::addx, rd_ra_rb));
        xo(0x1C9, op!("divdu", integer::divdux, rd_ra_rb));
        xo(0x1CB, op!("divwu", integer::divwux, rd_ra_rb));
        xo(0x1E9, op!("divd", integer::divdx, rd_ra_rb));
        xo(0x1EB, op!("divw", integer::divwx, rd_ra_rb));

        t[0x000] = op!("cmp", integer::cmp, cmp_reg);
        t[0x004] = op!("tw", system::tw, trap_reg);
        t[0x009] = op!("mulhdu", integer::mulhdux, rd_ra_rb);
        t[0x00B] = op!("mulhwu", integer::mulhwux, rd_ra_rb);
        t[0x013] = op!("mfocrf", system::mfocrf, mfocrf);
        t[0x014] = op!("lwarx", load_store::lwarx, load_x);
        t[0x015] = op!("ldx", load_store::ldx, load_x);
        t[0x017] = op!("lwzx", load_store::lwzx, load_x);
        t[0x018] = op!("slw", integer::slwx, ra_rs_rb);
        t[0x01A] = op!("cntlzw", integer::cntlzwx, ra_rs);
        t[0x01B] = op!("sld", integer::sldx, ra_rs_rb);
        t[0x01C] = op!("and", integer::andx, ra_rs_rb);
        t[0x020] = op!("cmpl", integer::cmpl, cmp_reg);
        t[0x035] = op!("ldux", load_store::ldux, load_xu);
        t[0x036] = op!("dcbst", system::dcbst, ra0_rb);
        t[0x037] = op!("lwzux", load_store::lwzux, load_xu);
        t[0x03A] = op!("cntlzd", integer::cntlzdx, ra_rs);
        t[0x03C] = op!("andc", integer::andcx, ra_rs_rb);
        t[0x044] = op!("td", system::td, trap_reg);
        t[0x049] = op!("mulhd", integer::mulhdx, rd_ra_rb);
        t[0x04B] = op!("mulhw", integer::mulhwx, rd_ra_rb);
        t[0x054] = op!("ldarx", load_store::ldarx, load_x);
        t[0x056] = op!("dcbf", system::dcbf, ra0_rb);
        t[0x057] = op!("lbzx", load_store::lbzx, load_x);
        t[0x067] = op!("lvx", load_store::lvx, load_vx);
        t[0x077] = op!("lbzux", load_store::lbzux, load_xu);
        t[0x07C] = op!("nor", integer::norx, ra_rs_rb);
        t[0x090] = op!("mtocrf", system::mtocrf, mtocrf);
        t[0x095] = op!("stdx", load_store::stdx, store_x);
        t[0x096] = op!("stwcx.", load_store::stwcx_, store_x_cr0);
        t[0x097] = op!("stwx", load_store::stwx, store_x);
        t[0x0B5] = op!("stdux", load_store::stdux, store_xu);
        t[0x0B7] = op!("stwux", load_store::stwux, store_xu);
        t[0x0D6] = op!("stdcx.", load_store::stdcx_, store_x_cr0);
        t[0x0D7] = op!("stbx", load_store::stbx, store_x);
        t[0x0E7] = op!("stvx", load_store::stvx, store_vx);
        t[0x0F6] = op!("dcbtst", system::dcbtst, ra0_rb);
        t[0x0F7] = op!("stbux", load_store::stbux, store_xu);
        t[0x116] = op!("dcbt", system::dcbt, ra0_rb);
        t[0x117] = op!("lhzx", load_store::lhzx, load_x);
        t[0x11C] = op!("eqv", integer::eqvx, ra_rs_rb);
        t[0x137] = op!("lhzux", load_store::lhzux, load_xu);
        t[0x13C] = op!("xor", integer::xorx, ra_rs_rb);
        t[0x153] = op!("mfspr", system::mfspr, mfspr);
        t[0x155] = op!("lwax", load_store::lwax, load_x);
        t[0x157] = op!("lhax", load_store::lhax, load_x);
        t[0x173] = op!("mftb", system::mftb, rd);
        t[0x175] = op!("lwaux", load_store::lwaux, load_xu);
        t[0x177] = op!("lhaux", load_store::lhaux, load_xu);
        t[0x197] = op!("sthx", load_store::sthx, store_x);
        t[0x19C] = op!("orc", integer::orcx, ra_rs_rb);
        t[0x1B7] = op!("sthux", load_store::sthux, store_xu);
        t[0x1BC] = op!("or", integer::orx, ra_rs_rb);
        t[0x1D3] = op!("mtspr", system::mtspr, mtspr);
        t[0x1DC] = op!("nand", integer::nandx, ra_rs_rb);
        t[0x214] = op!("ldbrx", load_store::ldbrx, load_x);
        t[0x216] = op!("lwbrx", load_store::lwbrx, load_x);
        t[0x217] = op!("lfsx", load_store::lfsx, load_fx);
        t[0x218] = op!("srw", integer::srwx, ra_rs_rb);
        t[0x21B] = op!("srd", integer::srdx, ra_rs_rb);
        t[0x237] = op!("lfsux", load_store::lfsux, load_fxu);
        t[0x255] = op!("lswi", load_store::lswi, lswi, unlowered);
        t[0x256] = op!("sync", system::sync, none);
        t[0x257] = op!("lfdx", load_store::lfdx, load_fx);
        t[0x277] = op!("lfdux", load_store::lfdux, load_fxu);
        t[0x294] = op!("stdbrx", load_store::stdbrx, store_x);
        t[0x296] = op!("stwbrx", load_store::stwbrx, store_x);
        t[0x297] = op!("stfsx", load_store::stfsx, store_fx);
        t[0x2B7] = op!("stfsux", load_store::stfsux, store_fxu);
        t[0x2D5] = op!("stswi", load_store::stswi, stswi, unlowered);
        t[0x2D7] = op!("stfdx", load_store::stfdx, store_fx);
        t[0x2F7] = op!("stfdux", load_store::stfdux, store_fxu);
        t[0x316] = op!("lhbrx", load_store::lhbrx, load_x);
        t[0x318] = op!("sraw", integer::srawx, ra_rs_rb_ca);
        t[0x31A] = op!("srad", integer::sradx, ra_rs_rb_ca);
        t[0x338] = op!("srawi", integer::srawix, ra_rs_ca);
        t[0x33A] = op!("sradi", integer::sradix, ra_rs_ca);
        t[0x33B] = op!("sradi", integer::sradix, ra_rs_ca);
        t[0x356] = op!("eieio", system::eieio, none);
        t[0x396] = op!("sthbrx", load_store::sthbrx, store_x);
        t[0x39A] = op!("extsh", integer::extshx, ra_rs);
        t[0x3BA] = op!("extsb", integer::extsbx, ra_rs);
        t[0x3D6] = op!("icbi", system::icbi, ra0_rb);
        t[0x3D7] = op!("stfiwx", load_store::stfiwx, store_fx);
        t[0x3DA] = op!("extsw", integer::extswx, ra_rs);
        t[0x3F6] = op!("dcbz", system::dcbz, ra0_rb);
    }

    fn fill_table58_62(&mut self) {
        self.table58[0] = op!("ld", load_store::ld, load_d);
        self.table58[1] = op!("ldu", load_store::ldu, load_du);
        self.table58[2] = op!("lwa", load_store::lwa, load_d);
        self.table62[0] = op!("std", load_store::std, store_d);
        self.table62[1] = op!("stdu", load_store::stdu, store_du);
    }

    fn fill_table59(&mut self) {
        let t = &mut self.table59;
        t[18] = op!("fdivs", float::fdivsx, frd_fra_frb);
        t[20] = op!("fsubs", float::fsubsx, frd_fra_frb);
        t[21] = op!("fadds", float::faddsx, frd_fra_frb);
        t[22] = op!("fsqrts", float::fsqrtsx, frd_frb);
        t[24] = op!("fres", float::fresx, frd_frb);
        t[25] = op!("fmuls", float::fmulsx, frd_fra_frc);
        t[28] = op!("fmsubs", float::fmsubsx, frd_fra_frb_frc);
        t[29] = op!("fmadds", float::fmaddsx, frd_fra_frb_frc);
        t[30] = op!("fnmsubs", float::fnmsubsx, frd_fra_frb_frc);
        t[31] = op!("fnmadds", float::fnmaddsx, frd_fra_frb_frc);
    }

    fn fill_table63(&mut self) {
        let a = &mut self.table63;
        a[18] = op!("fdiv", float::fdivx, frd_fra_frb);
        a[20] = op!("fsub", float::fsubx, frd_fra_frb);
        a[21] = op!("fadd", float::faddx, frd_fra_frb);
        a[22] = op!("fsqrt", float::fsqrtx, frd_frb);
        a[23] = op!("fsel", float::fselx, frd_fra_frb_frc);
        a[25] = op!("fmul", float::fmulx, frd_fra_frc);
        a[26] = op!("frsqrte", float::frsqrtex, frd_frb);
        a[28] = op!("fmsub", float::fmsubx, frd_fra_frb_frc);
        a[29] = op!("fmadd", float::fmaddx, frd_fra_frb_frc);
        a[30] = op!("fnmsub", float::fnmsubx, frd_fra_frb_frc);
        a[31] = op!("fnmadd", float::fnmaddx, frd_fra_frb_frc);

        let x = &mut self.table63_;
        x[0] = op!("fcmpu", float::fcmpu, fcmp);
        x[12] = op!("frsp", float::frspx, frd_frb);
        x[14] = op!("fctiw", float::fctiwx, frd_frb);
        x[15] = op!("fctiwz", float::fctiwzx, frd_frb);
        x[32] = op!("fcmpo", float::fcmpo, fcmp);
        x[38] = op!("mtfsb1", float::mtfsb1x, fpscr_write, unlowered);
        x[40] = op!("fneg", float::fnegx, frd_frb);
        x[70] = op!("mtfsb0", float::mtfsb0x, fpscr_write, unlowered);
        x[72] = op!("fmr", float::fmrx, frd_frb);
        x[134] = op!("mtfsfi", float::mtfsfix, fpscr_write, unlowered);
        x[136] = op!("fnabs", float::fnabsx, frd_frb);
        x[264] = op!("fabs", float::fabsx, frd_frb);
        x[583] = op!("mffs", float::mffsx, frd, unlowered);
        x[711] = op!("mtfsf", float::mtfsfx, mtfsf, unlowered);
        x[814] = op!("fctid", float::fctidx, frd_frb);
        x[815] = op!("fctidz", float::fctidzx, frd_frb);
        x[846] = op!("fcfid", float::fcfidx, frd_frb);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_primary() {
        assert_eq!(mnemonic(0x38600064), "addi");
        assert_eq!(mnemonic(0x48000100), "b");
        assert_eq!(mnemonic(0x80650000), "lwz");
        assert_eq!(mnemonic(0x44000002), "sc");
    }

    #[test]
    fn test_decode_extended() {
        assert_eq!(mnemonic(0x7C642A14), "add");
        assert_eq!(mnemonic(0x7C642E14), "add"); // addo
        assert_eq!(mnemonic(0x7C0802A6), "mfspr");
        assert_eq!(mnemonic(0x4E800020), "bclr");
        assert_eq!(mnemonic(0x4E800420), "bcctr");
        assert_eq!(mnemonic(0x7C63FE76), "sradi");
        assert_eq!(mnemonic(0xE861FFF8), "ld");
        assert_eq!(mnemonic(0xF821FF81), "stdu");
        assert_eq!(mnemonic(0x78630020), "rldicl");
    }

    #[test]
    fn test_decode_three_levels() {
        // fadd f1, f2, f3 (A-form)
        assert_eq!(mnemonic(0xFC22182A), "fadd");
        // fmr f1, f2 (falls through to the X-form table)
        assert_eq!(mnemonic(0xFC201090), "fmr");
        // vperm v1, v2, v3, v4 (VA-form)
        assert_eq!(mnemonic(0x1022192B), "vperm");
        // vor v1, v2, v3 (falls through to the VX-form table)
        assert_eq!(mnemonic(0x10221C84), "vor");
        // fadds f1, f2, f3
        assert_eq!(mnemonic(0xEC22182A), "fadds");
    }

    #[test]
    fn test_unknown_sentinel() {
        let entry = decode(Instruction(0x00000000));
        assert_eq!(entry.kind, EntryKind::Invalid);
        assert!(!entry.is_valid());
        assert!(!Instruction(0x00000000).is_valid());
        assert!(Instruction(0x60000000).is_valid());

        // Unmapped slot inside a sub-table
        assert_eq!(mnemonic(0x7C0007FE), "unknown");
    }

    #[test]
    fn test_decode_is_total_and_deterministic() {
        for word in (0u32..=u32::MAX).step_by(0x10001) {
            let a = decode(Instruction(word));
            let b = decode(Instruction(word));
            assert!(std::ptr::eq(a, b));
            assert_ne!(a.name, "table");
        }
    }
}
