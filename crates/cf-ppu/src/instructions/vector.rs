//! VMX (AltiVec) instructions

use super::Step;
use crate::instruction::Instruction;
use crate::interpreter::PpuInterpreter;
use crate::thread::PpuThread;
use crate::vmx::V128;

macro_rules! bitwise {
    ($($name:ident: |$a:ident, $b:ident| $body:expr;)*) => {
        $(
            pub fn $name(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
                let ($a, $b) = (t.vr(i.va()), t.vr(i.vb()));
                t.set_vr(i.vd(), $body);
                Ok(())
            }
        )*
    };
}

bitwise! {
    vand: |a, b| a & b;
    vandc: |a, b| a & !b;
    vor: |a, b| a | b;
    vnor: |a, b| !(a | b);
    vxor: |a, b| a ^ b;
}

pub fn vsel(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let (a, b, c) = (t.vr(i.va()), t.vr(i.vb()), t.vr(i.vc()));
    t.set_vr(i.vd(), (b & c) | (a & !c));
    Ok(())
}

pub fn vperm(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let (a, b, c) = (t.vr(i.va()), t.vr(i.vb()), t.vr(i.vc()));
    let data = std::array::from_fn(|n| {
        let sel = (c.data[n] & 0x1F) as usize;
        if sel < 16 {
            a.data[sel]
        } else {
            b.data[sel - 16]
        }
    });
    t.set_vr(i.vd(), V128::from_bytes(data));
    Ok(())
}

// Modular integer arithmetic

pub fn vaddubm(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let (a, b) = (t.vr(i.va()).data, t.vr(i.vb()).data);
    t.set_vr(i.vd(), V128::from_bytes(std::array::from_fn(|n| a[n].wrapping_add(b[n]))));
    Ok(())
}

pub fn vsububm(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let (a, b) = (t.vr(i.va()).data, t.vr(i.vb()).data);
    t.set_vr(i.vd(), V128::from_bytes(std::array::from_fn(|n| a[n].wrapping_sub(b[n]))));
    Ok(())
}

pub fn vadduhm(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let (a, b) = (t.vr(i.va()).as_u16x8(), t.vr(i.vb()).as_u16x8());
    t.set_vr(i.vd(), V128::from_u16x8(std::array::from_fn(|n| a[n].wrapping_add(b[n]))));
    Ok(())
}

pub fn vsubuhm(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let (a, b) = (t.vr(i.va()).as_u16x8(), t.vr(i.vb()).as_u16x8());
    t.set_vr(i.vd(), V128::from_u16x8(std::array::from_fn(|n| a[n].wrapping_sub(b[n]))));
    Ok(())
}

pub fn vadduwm(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let (a, b) = (t.vr(i.va()).as_u32x4(), t.vr(i.vb()).as_u32x4());
    t.set_vr(i.vd(), V128::from_u32x4(std::array::from_fn(|n| a[n].wrapping_add(b[n]))));
    Ok(())
}

pub fn vsubuwm(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let (a, b) = (t.vr(i.va()).as_u32x4(), t.vr(i.vb()).as_u32x4());
    t.set_vr(i.vd(), V128::from_u32x4(std::array::from_fn(|n| a[n].wrapping_sub(b[n]))));
    Ok(())
}

// Float

pub fn vaddfp(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let (a, b) = (t.vr(i.va()).as_f32x4(), t.vr(i.vb()).as_f32x4());
    t.set_vr(i.vd(), V128::from_f32x4(std::array::from_fn(|n| a[n] + b[n])));
    Ok(())
}

pub fn vsubfp(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let (a, b) = (t.vr(i.va()).as_f32x4(), t.vr(i.vb()).as_f32x4());
    t.set_vr(i.vd(), V128::from_f32x4(std::array::from_fn(|n| a[n] - b[n])));
    Ok(())
}

/// vD = vA * vC + vB
pub fn vmaddfp(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let a = t.vr(i.va()).as_f32x4();
    let b = t.vr(i.vb()).as_f32x4();
    let c = t.vr(i.vc()).as_f32x4();
    t.set_vr(i.vd(), V128::from_f32x4(std::array::from_fn(|n| a[n].mul_add(c[n], b[n]))));
    Ok(())
}

// Splat and compare

pub fn vspltw(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let word = t.vr(i.vb()).as_u32x4()[(i.vuimm() & 3) as usize];
    t.set_vr(i.vd(), V128::from_u32x4([word; 4]));
    Ok(())
}

pub fn vspltisw(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    t.set_vr(i.vd(), V128::from_u32x4([i.vsimm() as u32; 4]));
    Ok(())
}

/// Record form sets CR6 to "all equal" (0b1000) or "none equal" (0b0010)
pub fn vcmpequw(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let (a, b) = (t.vr(i.va()).as_u32x4(), t.vr(i.vb()).as_u32x4());
    let result: [u32; 4] = std::array::from_fn(|n| if a[n] == b[n] { u32::MAX } else { 0 });
    t.set_vr(i.vd(), V128::from_u32x4(result));
    if i.vrc() {
        let all = result.iter().all(|&w| w == u32::MAX);
        let none = result.iter().all(|&w| w == 0);
        t.set_cr_field(6, ((all as u32) << 3) | ((none as u32) << 1));
    }
    Ok(())
}

// VSCR moves

pub fn mfvscr(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    let vscr = t.regs.vscr;
    t.set_vr(i.vd(), V128::from_u32x4([0, 0, 0, vscr]));
    Ok(())
}

pub fn mtvscr(_: &PpuInterpreter, t: &mut PpuThread, i: Instruction) -> Step {
    t.regs.vscr = t.vr(i.vb()).as_u32x4()[3];
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cf_memory::MemoryManager;

    fn setup() -> (PpuInterpreter, PpuThread) {
        let memory = MemoryManager::new().unwrap();
        (PpuInterpreter::new(memory.clone()), PpuThread::new(0, memory))
    }

    #[test]
    fn test_vadduwm_wraps() {
        let (interp, mut t) = setup();
        t.set_vr(2, V128::from_u32x4([u32::MAX, 1, 2, 3]));
        t.set_vr(3, V128::from_u32x4([1, 1, 1, 1]));
        // vadduwm v1, v2, v3
        vadduwm(&interp, &mut t, Instruction(0x10221880)).unwrap();
        assert_eq!(t.vr(1).as_u32x4(), [0, 2, 3, 4]);
    }

    #[test]
    fn test_vperm_selects_bytes() {
        let (interp, mut t) = setup();
        t.set_vr(2, V128::from_bytes(std::array::from_fn(|n| n as u8)));
        t.set_vr(3, V128::from_bytes(std::array::from_fn(|n| 0x10 + n as u8)));
        t.set_vr(4, V128::from_bytes(std::array::from_fn(|n| 31 - n as u8)));
        // vperm v1, v2, v3, v4
        vperm(&interp, &mut t, Instruction(0x1022192B)).unwrap();
        assert_eq!(t.vr(1).data[0], 0x1F);
        assert_eq!(t.vr(1).data[15], 0x10);
    }

    #[test]
    fn test_vcmpequw_record() {
        let (interp, mut t) = setup();
        t.set_vr(2, V128::from_u32x4([1, 2, 3, 4]));
        t.set_vr(3, V128::from_u32x4([1, 2, 3, 4]));
        // vcmpequw. v1, v2, v3
        vcmpequw(&interp, &mut t, Instruction(0x10221C86)).unwrap();
        assert_eq!(t.vr(1).as_u128(), u128::MAX);
        assert_eq!(t.cr_field(6), 0b1000);

        t.set_vr(3, V128::from_u32x4([0, 0, 0, 0]));
        vcmpequw(&interp, &mut t, Instruction(0x10221C86)).unwrap();
        assert_eq!(t.cr_field(6), 0b0010);
    }

    #[test]
    fn test_splats() {
        let (interp, mut t) = setup();
        // vspltisw v1, -1
        vspltisw(&interp, &mut t, Instruction(0x103F038C)).unwrap();
        assert_eq!(t.vr(1).as_u32x4(), [u32::MAX; 4]);

        t.set_vr(2, V128::from_u32x4([10, 20, 30, 40]));
        // vspltw v1, v2, 2
        vspltw(&interp, &mut t, Instruction(0x1022128C)).unwrap();
        assert_eq!(t.vr(1).as_u32x4(), [30; 4]);
    }

    #[test]
    fn test_vmaddfp() {
        let (interp, mut t) = setup();
        t.set_vr(2, V128::from_f32x4([1.0, 2.0, 3.0, 4.0]));
        t.set_vr(3, V128::from_f32x4([1.0; 4]));
        t.set_vr(4, V128::from_f32x4([2.0; 4]));
        // vmaddfp v1, v2, v4, v3 (v2 * v4 + v3)
        vmaddfp(&interp, &mut t, Instruction(0x1022192E)).unwrap();
        assert_eq!(t.vr(1).as_f32x4(), [3.0, 5.0, 7.0, 9.0]);
    }
}
